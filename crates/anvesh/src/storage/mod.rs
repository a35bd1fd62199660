pub mod lance_store;
pub mod neighbor_index;

pub use lance_store::{LanceStore, VectorHit};
pub use neighbor_index::{NeighborEntry, NeighborIndex};

use crate::types::ChunkMetadata;

/// A chunk as staged for the vector store: preview + metadata + embedding.
/// The full body lives only in the lexical index.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub cid: String,
    pub preview: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}
