use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Flat metadata record carried by every chunk. Hierarchy labels derived from
/// the root configuration live in the open-ended `hierarchy` map; everything
/// else is a fixed field so responses serialize in a stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub app: String,
    pub source_path: String,
    pub section_title: String,
    pub seq_idx: u32,
    pub ingested_at: String,
    pub hash: String,
    pub simhash: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hierarchy: BTreeMap<String, String>,
}

/// A chunk as produced by ingestion, before it fans out to the stores.
/// `cid` is content-addressed: `"h:" + hex(sha256(normalize_for_hash(body)))`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub cid: String,
    pub body: String,
    pub preview: String,
    pub metadata: ChunkMetadata,
}

/// Which retrieval signals to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Hybrid,
    Dense,
    Sparse,
}

impl Signal {
    pub fn wants_dense(self) -> bool {
        matches!(self, Signal::Hybrid | Signal::Dense)
    }

    pub fn wants_sparse(self) -> bool {
        matches!(self, Signal::Hybrid | Signal::Sparse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Hybrid => "hybrid",
            Signal::Dense => "dense",
            Signal::Sparse => "sparse",
        }
    }
}

impl FromStr for Signal {
    type Err = RetrieveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hybrid" => Ok(Signal::Hybrid),
            "dense" => Ok(Signal::Dense),
            "sparse" => Ok(Signal::Sparse),
            other => Err(RetrieveError::BadRequest(format!(
                "signal must be one of hybrid|dense|sparse, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed parameters for one retrieve call. Produced by the HTTP layer (or a
/// test harness) and consumed by the planner.
#[derive(Debug, Clone)]
pub struct RetrieveParams {
    pub q: String,
    pub app: String,
    pub top_k: usize,
    pub pool: usize,
    pub signal: Signal,
    /// Raw required tokens (space/comma separated input, already split).
    pub must: Vec<String>,
    /// Raw required phrases (`;`-separated input, already split and trimmed).
    pub must_phrases: Vec<String>,
    pub min_hits: usize,
    pub proximity: usize,
}

/// Per-result diagnostics: how well the chunk satisfied the constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultDebug {
    pub coverage: f32,
    pub token_hits: Vec<String>,
    pub phrase_hits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub debug: ResultDebug,
}

/// Candidate pool sizes observed at each pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSizes {
    pub dense: usize,
    pub sparse: usize,
    pub fused: usize,
    pub candidates: usize,
    pub post_filter_kept: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveDebug {
    pub pool_sizes: PoolSizes,
    pub signal: Signal,
    pub dense_available: bool,
    pub sparse_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub app: String,
    pub top_k: usize,
    pub results: Vec<RetrievedDoc>,
    pub debug: RetrieveDebug,
}

/// A chunk returned by `/neighbors` or `/by_ids` (no ranking diagnostics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDoc {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// Error kinds at the online request boundary. The router maps these onto
/// HTTP status codes; nothing else escapes a request.
#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("retrieval backend unavailable: {0}")]
    Transient(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_parse_round_trip() {
        for s in ["hybrid", "dense", "sparse"] {
            let sig: Signal = s.parse().unwrap();
            assert_eq!(sig.as_str(), s);
        }
        assert!("bm25".parse::<Signal>().is_err());
    }

    #[test]
    fn test_signal_routing_flags() {
        assert!(Signal::Hybrid.wants_dense() && Signal::Hybrid.wants_sparse());
        assert!(Signal::Dense.wants_dense() && !Signal::Dense.wants_sparse());
        assert!(!Signal::Sparse.wants_dense() && Signal::Sparse.wants_sparse());
    }

    #[test]
    fn test_metadata_serializes_hierarchy_when_present() {
        let mut hierarchy = BTreeMap::new();
        hierarchy.insert("module".to_string(), "billing".to_string());
        let meta = ChunkMetadata {
            app: "claims".to_string(),
            source_path: "/docs/refunds.md".to_string(),
            section_title: "Refunds".to_string(),
            seq_idx: 2,
            ingested_at: "2025-01-01T00:00:00Z".to_string(),
            hash: "abc".to_string(),
            simhash: 7,
            hierarchy,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["hierarchy"]["module"], "billing");
        assert_eq!(json["seq_idx"], 2);
    }
}
