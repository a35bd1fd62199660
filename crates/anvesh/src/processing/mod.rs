pub mod chunker;
pub mod parser;

pub use chunker::{ChunkPiece, Chunker};
pub use parser::{SourceRegistry, TextSource};
