pub mod tfidf_svd;

use anyhow::Result;

pub use tfidf_svd::{write_artifact, ArtifactHeader, TfidfSvdEmbedder};

/// Unified embedding seam. Implementations must return L2-normalized vectors
/// of a fixed dimension; the ingest pipeline probes the dimension once at
/// startup and treats any later disagreement as fatal.
pub trait Embedder: Send + Sync {
    /// Embed a single text into a unit-norm vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embedding for ingestion.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;

    /// Short identifier recorded in store metadata (e.g. `tfidf+svd/v1/384`).
    fn tag(&self) -> String;
}
