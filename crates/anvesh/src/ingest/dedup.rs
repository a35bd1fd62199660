//! Two-stage duplicate suppression, scoped to one ingestion run.
//!
//! Stage one is exact: a SHA-256 of the normalized body. Stage two is near:
//! a 64-bit SimHash compared by Hamming distance against every retained
//! fingerprint. The linear scan is O(N²) over the run but fine for corpora up
//! to a few hundred thousand chunks; an LSH banding scheme can replace it
//! behind the same `check` signature as long as the Hamming ≤ 3 predicate is
//! preserved.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::text;

/// Maximum Hamming distance at which two chunks count as near-duplicates.
pub const NEAR_DUP_MAX_HAMMING: u32 = 3;

/// SHA-256 of the normalized body, lowercase hex.
pub fn content_hash(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Content-addressed chunk id for a normalized body.
pub fn cid_for(normalized: &str) -> String {
    format!("h:{}", content_hash(normalized))
}

/// 64-bit SimHash over the token stream. Each token's md5 digest is read as a
/// big-endian 128-bit integer; bit i of the fingerprint is set iff the signed
/// sum of bit i across tokens is non-negative. Empty input hashes to 0.
pub fn simhash64(tokens: &[String]) -> u64 {
    if tokens.is_empty() {
        return 0;
    }

    let mut acc = [0i32; 64];
    for token in tokens {
        let digest = md5::compute(token.as_bytes());
        let value = u128::from_be_bytes(digest.0);
        for (i, slot) in acc.iter_mut().enumerate() {
            if (value >> i) & 1 == 1 {
                *slot += 1;
            } else {
                *slot -= 1;
            }
        }
    }

    let mut out = 0u64;
    for (i, &v) in acc.iter().enumerate() {
        if v >= 0 {
            out |= 1 << i;
        }
    }
    out
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Verdict for one candidate chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupOutcome {
    /// First sighting: retain. Carries the content hash and SimHash.
    Fresh { hash: String, simhash: u64 },
    /// Normalized body already seen verbatim.
    ExactDuplicate,
    /// Within Hamming ≤ 3 of a retained chunk.
    NearDuplicate,
    /// Body normalizes to nothing; dropped without counting as a duplicate.
    Empty,
}

/// In-memory dedup state for a single ingestion run.
#[derive(Debug, Default)]
pub struct DedupEngine {
    seen_hashes: HashSet<String>,
    seen_simhashes: Vec<u64>,
    pub exact_skipped: u64,
    pub near_skipped: u64,
}

impl DedupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a candidate by its normalized body, updating run state.
    pub fn check(&mut self, normalized: &str) -> DedupOutcome {
        if normalized.is_empty() {
            return DedupOutcome::Empty;
        }

        let hash = content_hash(normalized);
        if self.seen_hashes.contains(&hash) {
            self.exact_skipped += 1;
            return DedupOutcome::ExactDuplicate;
        }

        let sim = simhash64(&text::tokenize(normalized));
        if self
            .seen_simhashes
            .iter()
            .any(|&prev| hamming(sim, prev) <= NEAR_DUP_MAX_HAMMING)
        {
            self.near_skipped += 1;
            return DedupOutcome::NearDuplicate;
        }

        self.seen_hashes.insert(hash.clone());
        self.seen_simhashes.push(sim);
        DedupOutcome::Fresh { hash, simhash: sim }
    }

    pub fn retained(&self) -> usize {
        self.seen_simhashes.len()
    }
}
