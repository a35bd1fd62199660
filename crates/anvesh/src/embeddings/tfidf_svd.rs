//! TF-IDF → truncated-SVD embedder backed by a versioned binary artifact.
//!
//! Artifact layout (all integers/floats little-endian):
//!   - u32 header length
//!   - JSON header: `{algo, version, vocab, dim, svd_components}`
//!   - `vocab.len()` f32 IDF weights
//!   - `vocab.len() * dim` f32 SVD projection matrix, row-major (one row per
//!     vocabulary term)
//!
//! Embedding is a pure function of `(text, artifact)`: tokenize, count vocab
//! terms, weight by IDF, L2-normalize the sparse TF-IDF vector, project
//! through the SVD matrix, L2-normalize the result. Texts sharing no term
//! with the vocabulary embed to the zero vector.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::text;

const ARTIFACT_ALGO: &str = "tfidf+svd";
const NORM_EPS: f32 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub algo: String,
    pub version: u32,
    pub vocab: Vec<String>,
    pub dim: usize,
    pub svd_components: usize,
}

pub struct TfidfSvdEmbedder {
    term_index: HashMap<String, usize>,
    idf: Array1<f32>,
    /// vocab_size × dim, row i is the projection of vocabulary term i.
    projection: Array2<f32>,
    dim: usize,
    version: u32,
}

impl TfidfSvdEmbedder {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read embedder artifact: {}", path.display()))?;
        Self::from_bytes(&bytes)
            .with_context(|| format!("Malformed embedder artifact: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let header_len = cursor.read_u32()? as usize;
        let header_bytes = cursor.read_slice(header_len)?;
        let header: ArtifactHeader =
            serde_json::from_slice(header_bytes).context("Invalid artifact header JSON")?;

        if header.algo != ARTIFACT_ALGO {
            anyhow::bail!("Unsupported artifact algo '{}'", header.algo);
        }
        if header.dim == 0 || header.vocab.is_empty() {
            anyhow::bail!("Artifact declares empty vocabulary or zero dimension");
        }
        if header.svd_components != header.dim {
            anyhow::bail!(
                "Artifact svd_components ({}) disagrees with dim ({})",
                header.svd_components,
                header.dim
            );
        }

        let vocab_size = header.vocab.len();
        let idf = Array1::from_vec(cursor.read_f32s(vocab_size)?);
        let projection_flat = cursor.read_f32s(vocab_size * header.dim)?;
        if !cursor.is_empty() {
            anyhow::bail!("Trailing bytes after projection matrix");
        }
        let projection = Array2::from_shape_vec((vocab_size, header.dim), projection_flat)
            .context("Projection matrix shape mismatch")?;

        let term_index = header
            .vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        Ok(Self {
            term_index,
            idf,
            projection,
            dim: header.dim,
            version: header.version,
        })
    }

    /// Term-frequency counts restricted to the artifact vocabulary.
    fn term_counts(&self, tokens: &[String]) -> HashMap<usize, f32> {
        let mut counts: HashMap<usize, f32> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.term_index.get(token) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        counts
    }
}

impl Embedder for TfidfSvdEmbedder {
    fn embed(&self, text_input: &str) -> Result<Vec<f32>> {
        let tokens = text::tokenize(text_input);
        let counts = self.term_counts(&tokens);

        // Sparse TF-IDF weights, L2-normalized before projection. Accumulation
        // runs in ascending term order so repeated embeddings of the same text
        // are bit-identical.
        let mut weighted: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        weighted.sort_unstable_by_key(|(idx, _)| *idx);
        let sq_sum: f32 = weighted.iter().map(|(_, w)| w * w).sum();
        let tfidf_norm = sq_sum.sqrt() + NORM_EPS;

        let mut v = Array1::<f32>::zeros(self.dim);
        for (idx, w) in weighted {
            v.scaled_add(w / tfidf_norm, &self.projection.row(idx));
        }

        let out_norm = v.dot(&v).sqrt() + NORM_EPS;
        v.mapv_inplace(|x| x / out_norm);
        Ok(v.to_vec())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.par_iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn tag(&self) -> String {
        format!("{ARTIFACT_ALGO}/v{}/{}", self.version, self.dim)
    }
}

/// Serialize an artifact. Used by model-building tooling and test fixtures;
/// `idf.len()` must equal `vocab.len()` and `projection` must be
/// `vocab.len() × dim` row-major.
pub fn write_artifact(
    path: &Path,
    vocab: &[String],
    dim: usize,
    idf: &[f32],
    projection: &[f32],
) -> Result<()> {
    if idf.len() != vocab.len() {
        anyhow::bail!("idf length {} != vocab size {}", idf.len(), vocab.len());
    }
    if projection.len() != vocab.len() * dim {
        anyhow::bail!(
            "projection length {} != vocab size {} * dim {}",
            projection.len(),
            vocab.len(),
            dim
        );
    }

    let header = ArtifactHeader {
        algo: ARTIFACT_ALGO.to_string(),
        version: 1,
        vocab: vocab.to_vec(),
        dim,
        svd_components: dim,
    };
    let header_bytes = serde_json::to_vec(&header).context("Failed to encode artifact header")?;

    let mut out =
        Vec::with_capacity(4 + header_bytes.len() + 4 * (idf.len() + projection.len()));
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    for w in idf {
        out.extend_from_slice(&w.to_le_bytes());
    }
    for w in projection {
        out.extend_from_slice(&w.to_le_bytes());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(path, out)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.bytes.len())
            .context("Artifact truncated")?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_slice(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_f32s(&mut self, count: usize) -> Result<Vec<f32>> {
        let raw = self.read_slice(count * 4)?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> TfidfSvdEmbedder {
        // 3-term vocab projected into 2 dimensions.
        let vocab: Vec<String> = ["refund", "escalation", "approval"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let idf = [1.0f32, 2.0, 1.5];
        #[rustfmt::skip]
        let projection = [
            1.0, 0.0,
            0.0, 1.0,
            1.0, 1.0,
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        write_artifact(&path, &vocab, 2, &idf, &projection).unwrap();
        TfidfSvdEmbedder::load(&path).unwrap()
    }

    #[test]
    fn test_round_trip_and_metadata() {
        let embedder = fixture();
        assert_eq!(embedder.dimension(), 2);
        assert_eq!(embedder.tag(), "tfidf+svd/v1/2");
    }

    #[test]
    fn test_embedding_is_unit_norm() {
        let embedder = fixture();
        let v = embedder.embed("refund escalation approval").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let embedder = fixture();
        let a = embedder.embed("refund requires approval").unwrap();
        let b = embedder.embed("refund requires approval").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_out_of_vocab_text_embeds_to_zero() {
        let embedder = fixture();
        let v = embedder.embed("completely unrelated words").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_single_term_direction() {
        let embedder = fixture();
        // "escalation" projects onto the second axis only.
        let v = embedder.embed("escalation").unwrap();
        assert!(v[0].abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = fixture();
        let single = embedder.embed("refund approval").unwrap();
        let batch = embedder.embed_batch(&["refund approval"]).unwrap();
        assert_eq!(batch[0], single);
    }

    #[test]
    fn test_truncated_artifact_rejected() {
        let vocab = vec!["a".to_string()];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        write_artifact(&path, &vocab, 2, &[1.0], &[0.5, 0.5]).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(TfidfSvdEmbedder::from_bytes(&bytes).is_err());
    }
}
