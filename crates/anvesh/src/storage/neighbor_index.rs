//! Per-app neighbor side-index: `(source_path, seq_idx) → cid`.
//!
//! Ingestion writes one JSON file per app; `/neighbors` resolves its radius
//! window here and only touches the vector store to hydrate the resolved
//! cids. Lookups are exact for any corpus size, unlike scanning the first N
//! rows of the vector store.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub source_path: String,
    pub seq_idx: u32,
    pub cid: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NeighborIndex {
    entries: Vec<NeighborEntry>,
}

impl NeighborIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source_path: &str, seq_idx: u32, cid: &str) {
        self.entries.push(NeighborEntry {
            source_path: source_path.to_string(),
            seq_idx,
            cid: cid.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chunks from the same file with `|seq_idx - requested| <= radius`, in
    /// reading order, up to `limit`.
    pub fn lookup(
        &self,
        source_path: &str,
        seq_idx: u32,
        radius: u32,
        limit: usize,
    ) -> Vec<&NeighborEntry> {
        let low = seq_idx.saturating_sub(radius);
        let high = seq_idx.saturating_add(radius);

        let mut matches: Vec<&NeighborEntry> = self
            .entries
            .iter()
            .filter(|e| e.source_path == source_path && e.seq_idx >= low && e.seq_idx <= high)
            .collect();
        matches.sort_by_key(|e| e.seq_idx);
        matches.truncate(limit);
        matches
    }

    /// Persist sorted by (source_path, seq_idx) so re-ingesting an unchanged
    /// corpus writes byte-identical files.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.entries
            .sort_by(|a, b| (a.source_path.as_str(), a.seq_idx).cmp(&(b.source_path.as_str(), b.seq_idx)));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let body = serde_json::to_string(&self).context("Failed to encode neighbor index")?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write neighbor index: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read neighbor index: {}", path.display()))?;
        serde_json::from_str(&body)
            .with_context(|| format!("Malformed neighbor index: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NeighborIndex {
        let mut index = NeighborIndex::new();
        for i in 0..6 {
            index.push("/docs/refunds.md", i, &format!("h:refund{i}"));
        }
        for i in 0..3 {
            index.push("/docs/fraud.md", i, &format!("h:fraud{i}"));
        }
        index
    }

    #[test]
    fn test_radius_window() {
        let index = sample();
        let hits = index.lookup("/docs/refunds.md", 3, 1, 10);
        let seqs: Vec<u32> = hits.iter().map(|e| e.seq_idx).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn test_other_files_excluded() {
        let index = sample();
        let hits = index.lookup("/docs/fraud.md", 0, 5, 10);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|e| e.source_path == "/docs/fraud.md"));
    }

    #[test]
    fn test_limit_applies_in_reading_order() {
        let index = sample();
        let hits = index.lookup("/docs/refunds.md", 2, 5, 2);
        let seqs: Vec<u32> = hits.iter().map(|e| e.seq_idx).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn test_radius_zero_is_self_only() {
        let index = sample();
        let hits = index.lookup("/docs/refunds.md", 2, 0, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].cid, "h:refund2");
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.json");

        let mut index = sample();
        index.save(&path).unwrap();

        let loaded = NeighborIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(
            loaded.lookup("/docs/refunds.md", 1, 1, 10).len(),
            index.lookup("/docs/refunds.md", 1, 1, 10).len()
        );
    }

    #[test]
    fn test_save_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.json");
        let b_path = dir.path().join("b.json");

        let mut a = NeighborIndex::new();
        a.push("/docs/b.md", 1, "h:b1");
        a.push("/docs/a.md", 0, "h:a0");
        a.save(&a_path).unwrap();

        let mut b = NeighborIndex::new();
        b.push("/docs/a.md", 0, "h:a0");
        b.push("/docs/b.md", 1, "h:b1");
        b.save(&b_path).unwrap();

        assert_eq!(
            std::fs::read(&a_path).unwrap(),
            std::fs::read(&b_path).unwrap()
        );
    }
}
