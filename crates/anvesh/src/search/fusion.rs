//! Reciprocal Rank Fusion across heterogeneous ranked lists.

use std::collections::HashMap;

/// RRF constant; dampens the influence of top ranks.
pub const RRF_K: f64 = 60.0;

/// Fuse 1-based rank maps: `score(cid) = Σ 1/(k + rank)`, a missing rank
/// contributing 0. Output is sorted by descending score with ascending-cid
/// tie-break so identical inputs always produce identical orderings.
pub fn reciprocal_rank_fusion(rank_maps: &[HashMap<String, usize>]) -> Vec<(String, f64)> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    for ranks in rank_maps {
        for (cid, &rank) in ranks {
            *scores.entry(cid.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
        }
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(cid, score)| (cid.to_string(), score))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

/// Build a 1-based rank map from an ordered id list (best first).
pub fn rank_map<I, S>(ids: I) -> HashMap<String, usize>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| (id.into(), i + 1))
        .collect()
}
