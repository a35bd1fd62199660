//! Text canonicalization shared by hashing, dedup, and lexical matching.
//!
//! Everything here is deterministic: the same input always produces the same
//! normalized string, token stream, and stopword verdicts. Chunk identity
//! (`cid`) is derived from `normalize_for_hash`, so changing these rules
//! invalidates every existing index.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)(^\s*page\s+\d+\s*$)|(^\s*confidential\s*$)").expect("valid regex")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "for", "to", "in", "on", "with", "by", "from", "as",
    "is", "are", "be", "was", "were", "it", "this", "that", "these", "those",
];

const DOMAIN_STOPWORDS: &[&str] = &["claim", "claims", "policy", "process", "team", "user"];

/// Canonical form used for content hashing: boilerplate lines removed,
/// lowercased, whitespace runs collapsed to single spaces, trimmed.
pub fn normalize_for_hash(text: &str) -> String {
    let stripped = BOILERPLATE_RE.replace_all(text, " ");
    let lowered = stripped.to_lowercase();
    WHITESPACE_RE.replace_all(&lowered, " ").trim().to_string()
}

/// Split text into lowercase word tokens (`[A-Za-z0-9_]+`).
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Stopword filter: a fixed English core plus a domain-noise set, both of
/// which can be extended from configuration.
#[derive(Debug, Clone)]
pub struct Stoplist {
    words: HashSet<String>,
}

impl Stoplist {
    pub fn new(extra: &[String], domain_extra: &[String]) -> Self {
        let mut words: HashSet<String> = ENGLISH_STOPWORDS
            .iter()
            .chain(DOMAIN_STOPWORDS.iter())
            .map(|w| w.to_string())
            .collect();
        words.extend(extra.iter().map(|w| w.to_lowercase()));
        words.extend(domain_extra.iter().map(|w| w.to_lowercase()));
        Self { words }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// Drop stopwords from a token stream, preserving order.
    pub fn strip<'a, I>(&self, tokens: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tokens
            .into_iter()
            .filter(|t| !self.contains(t))
            .cloned()
            .collect()
    }
}

impl Default for Stoplist {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_boilerplate_lines() {
        let text = "Refund policy overview\nPage 12\nCONFIDENTIAL\nEscalations go to tier two.";
        let norm = normalize_for_hash(text);
        assert_eq!(norm, "refund policy overview escalations go to tier two.");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        let a = normalize_for_hash("Refund   escalation\n\trequires  approval.");
        let b = normalize_for_hash("Refund escalation requires approval.");
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_keeps_inline_page_words() {
        // Only whole boilerplate lines are stripped, not inline occurrences.
        let norm = normalize_for_hash("see page 4 for details");
        assert_eq!(norm, "see page 4 for details");
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        let tokens = tokenize("Supervisor_A must GRANT approval-42!");
        assert_eq!(tokens, vec!["supervisor_a", "must", "grant", "approval", "42"]);
    }

    #[test]
    fn test_tokenize_empty_input() {
        assert!(tokenize("  \n\t ").is_empty());
        assert!(tokenize("£€±§").is_empty());
    }

    #[test]
    fn test_stoplist_core_and_domain() {
        let stops = Stoplist::default();
        assert!(stops.contains("the"));
        assert!(stops.contains("claims"));
        assert!(!stops.contains("refund"));
    }

    #[test]
    fn test_stoplist_extension_from_config() {
        let stops = Stoplist::new(&["Refund".to_string()], &["acme".to_string()]);
        assert!(stops.contains("refund"));
        assert!(stops.contains("acme"));
    }

    #[test]
    fn test_stoplist_strip_preserves_order() {
        let stops = Stoplist::default();
        let tokens = tokenize("the refund for escalation");
        assert_eq!(stops.strip(&tokens), vec!["refund", "escalation"]);
    }
}
