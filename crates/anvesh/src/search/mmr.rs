//! Maximal Marginal Relevance selection over a shortlist of candidate
//! vectors. Greedy: seed with the candidate most similar to the query, then
//! repeatedly take the candidate maximizing
//! `λ·sim(query) − (1−λ)·max sim(selected)`. All tie-breaks go to the lowest
//! index so selection is deterministic.

pub const MMR_LAMBDA: f32 = 0.7;

const NORM_EPS: f32 = 1e-9;

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + NORM_EPS)
}

/// Select up to `top_n` indices from `vectors`, diversity-blended against
/// `query`. Returns indices into `vectors` in selection order.
pub fn mmr_select(vectors: &[Vec<f32>], query: &[f32], top_n: usize, lambda: f32) -> Vec<usize> {
    if vectors.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let sim_q: Vec<f32> = vectors.iter().map(|v| cosine(v, query)).collect();

    let mut rest: Vec<usize> = (0..vectors.len()).collect();
    let mut selected = Vec::with_capacity(top_n.min(vectors.len()));

    // Seed: argmax sim to query; strict `>` keeps the lowest index on ties.
    let mut best_pos = 0;
    for (pos, &i) in rest.iter().enumerate() {
        if sim_q[i] > sim_q[rest[best_pos]] {
            best_pos = pos;
        }
    }
    selected.push(rest.remove(best_pos));

    while selected.len() < top_n && !rest.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (pos, &i) in rest.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&s| cosine(&vectors[i], &vectors[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda * sim_q[i] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }
        selected.push(rest.remove(best_pos));
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        // Zero vector guard: no NaN.
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_seed_is_most_query_similar() {
        let query = vec![1.0, 0.0];
        let vectors = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.7, 0.7],
        ];
        let picked = mmr_select(&vectors, &query, 1, MMR_LAMBDA);
        assert_eq!(picked, vec![1]);
    }

    #[test]
    fn test_near_duplicates_displaced_by_diversity() {
        // Candidates 0 and 1 are near-duplicates highly similar to the query;
        // 2 and 3 are slightly less relevant but diverse. Top-3 must keep only
        // one of the duplicate pair.
        let query = vec![1.0, 0.0, 0.0];
        let vectors = vec![
            vec![0.95, 0.312, 0.0],
            vec![0.949, 0.315, 0.0],
            vec![0.93, -0.368, 0.0],
            vec![0.93, 0.0, -0.368],
            vec![0.2, 0.98, 0.0],
        ];
        let picked = mmr_select(&vectors, &query, 3, MMR_LAMBDA);
        assert_eq!(picked, vec![0, 2, 3]);
        let dup_count = picked.iter().filter(|&&i| i == 0 || i == 1).count();
        assert_eq!(dup_count, 1);
    }

    #[test]
    fn test_tie_break_lowest_index() {
        let query = vec![1.0, 0.0];
        let vectors = vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]];
        let picked = mmr_select(&vectors, &query, 2, MMR_LAMBDA);
        assert_eq!(picked, vec![0, 1]);
    }

    #[test]
    fn test_top_n_clamped_to_candidates() {
        let query = vec![1.0];
        let vectors = vec![vec![1.0], vec![0.5]];
        let picked = mmr_select(&vectors, &query, 10, MMR_LAMBDA);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_zero_top_n() {
        let query = vec![1.0];
        assert!(mmr_select(&[vec![1.0]], &query, 0, MMR_LAMBDA).is_empty());
    }
}
