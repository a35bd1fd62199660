//! Hard keyword/phrase constraints and term-coverage scoring.

use crate::text;

/// Constraint diagnostics for one candidate. `coverage` sums the token-hit
/// fraction and the phrase-hit fraction, so it ranges over [0, 2].
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub coverage: f32,
    pub token_hits: Vec<String>,
    pub phrase_hits: Vec<String>,
}

/// Is `phrase` present in `words`? With `proximity == 0` the phrase tokens
/// must appear contiguously; otherwise every phrase token must occur inside a
/// window of `len(phrase) + proximity` starting at an occurrence of the first
/// phrase token.
pub fn phrase_present(words: &[String], phrase: &[String], proximity: usize) -> bool {
    if phrase.is_empty() || words.len() < phrase.len() {
        return false;
    }

    if proximity == 0 {
        return words.windows(phrase.len()).any(|w| w == phrase);
    }

    let window_len = phrase.len() + proximity;
    for (i, word) in words.iter().enumerate() {
        if word != &phrase[0] {
            continue;
        }
        let window = &words[i..(i + window_len).min(words.len())];
        if phrase.iter().all(|p| window.contains(p)) {
            return true;
        }
    }
    false
}

/// Score a candidate body against the required tokens and phrases.
/// `token_hits` comes back sorted for stable serialization; `phrase_hits`
/// preserves the request's phrase order.
pub fn coverage_report(
    body: &str,
    must_tokens: &[String],
    must_phrases: &[String],
    proximity: usize,
) -> CoverageReport {
    let words = text::tokenize(body);

    let mut token_hits: Vec<String> = must_tokens
        .iter()
        .filter(|t| words.contains(t))
        .cloned()
        .collect();
    token_hits.sort();
    token_hits.dedup();

    let phrase_hits: Vec<String> = must_phrases
        .iter()
        .filter(|p| phrase_present(&words, &text::tokenize(p), proximity))
        .cloned()
        .collect();

    let mut coverage = 0.0f32;
    if !must_tokens.is_empty() {
        coverage += token_hits.len() as f32 / must_tokens.len().max(1) as f32;
    }
    if !must_phrases.is_empty() {
        coverage += phrase_hits.len() as f32 / must_phrases.len().max(1) as f32;
    }

    CoverageReport {
        coverage,
        token_hits,
        phrase_hits,
    }
}

/// Strict filter predicate: at least `need` required tokens present (where
/// `need` is `min_hits` when positive, else all of them) AND every required
/// phrase present.
pub fn passes_filter(
    report: &CoverageReport,
    must_tokens: &[String],
    must_phrases: &[String],
    min_hits: usize,
) -> bool {
    let tokens_ok = if must_tokens.is_empty() {
        true
    } else {
        let need = if min_hits > 0 { min_hits } else { must_tokens.len() };
        report.token_hits.len() >= need
    };
    let phrases_ok = report.phrase_hits.len() == must_phrases.len();
    tokens_ok && phrases_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        text::tokenize(s)
    }

    #[test]
    fn test_phrase_contiguous() {
        let words = toks("the supervisor approval was granted");
        assert!(phrase_present(&words, &toks("supervisor approval"), 0));
        assert!(!phrase_present(&words, &toks("approval supervisor"), 0));
    }

    #[test]
    fn test_phrase_proximity_window() {
        // "supervisor must grant approval": contiguity fails, a 2-token
        // proximity window admits it.
        let words = toks("supervisor must grant approval");
        let phrase = toks("supervisor approval");
        assert!(!phrase_present(&words, &phrase, 0));
        assert!(!phrase_present(&words, &phrase, 1));
        assert!(phrase_present(&words, &phrase, 2));
    }

    #[test]
    fn test_phrase_window_anchors_on_first_token() {
        // Window opens at the first phrase token; a match before it is inert.
        let words = toks("approval then supervisor spoke");
        assert!(!phrase_present(&words, &toks("supervisor approval"), 1));
        assert!(!phrase_present(&words, &toks("supervisor approval"), 5));
    }

    #[test]
    fn test_phrase_longer_than_body() {
        let words = toks("approval");
        assert!(!phrase_present(&words, &toks("supervisor approval"), 3));
    }

    #[test]
    fn test_coverage_sums_fractions() {
        let body = "refund escalation requires supervisor approval";
        let must = vec!["refund".to_string(), "fraud".to_string()];
        let phrases = vec!["supervisor approval".to_string()];
        let report = coverage_report(body, &must, &phrases, 0);
        // 1/2 tokens + 1/1 phrases.
        assert!((report.coverage - 1.5).abs() < 1e-6);
        assert_eq!(report.token_hits, vec!["refund"]);
        assert_eq!(report.phrase_hits, vec!["supervisor approval"]);
    }

    #[test]
    fn test_coverage_no_constraints_is_zero() {
        let report = coverage_report("anything at all", &[], &[], 0);
        assert_eq!(report.coverage, 0.0);
        assert!(report.token_hits.is_empty());
        assert!(report.phrase_hits.is_empty());
    }

    #[test]
    fn test_token_hits_sorted_and_deduped() {
        let body = "beta alpha beta";
        let must = vec!["beta".to_string(), "alpha".to_string()];
        let report = coverage_report(body, &must, &[], 0);
        assert_eq!(report.token_hits, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_filter_all_tokens_by_default() {
        let must = vec!["refund".to_string(), "fraud".to_string()];
        let report = coverage_report("refund only here", &must, &[], 0);
        assert!(!passes_filter(&report, &must, &[], 0));
        assert!(passes_filter(&report, &must, &[], 1));
    }

    #[test]
    fn test_filter_requires_every_phrase() {
        let phrases = vec!["supervisor approval".to_string(), "tier two".to_string()];
        let report =
            coverage_report("supervisor approval granted", &[], &phrases, 0);
        assert!(!passes_filter(&report, &[], &phrases, 0));
    }

    #[test]
    fn test_filter_without_constraints_passes() {
        let report = coverage_report("free text", &[], &[], 0);
        assert!(passes_filter(&report, &[], &[], 0));
    }
}
