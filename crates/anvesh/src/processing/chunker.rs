//! Structure-aware document segmentation.
//!
//! Documents split first along detected section headings; inside a section we
//! emit windows of roughly `target_tokens` whitespace-tokens with `overlap`
//! tokens of carry-over. `seq_idx` increments globally across the document so
//! neighbor lookups can walk a file in reading order.

use std::sync::LazyLock;

use regex::Regex;

static MARKDOWN_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("valid regex"));

static NUMBERED_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*[.)]?\s+\S.*$").expect("valid regex"));

/// One emitted chunk: the owning section title (may be empty), the window
/// body, and its global position within the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    pub title: String,
    pub body: String,
    pub seq_idx: u32,
}

pub struct Chunker {
    target_tokens: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(target_tokens: usize, overlap: usize) -> Self {
        // Window arithmetic requires forward progress.
        let overlap = overlap.min(target_tokens.saturating_sub(1));
        Self {
            target_tokens: target_tokens.max(1),
            overlap,
        }
    }

    /// Split a document into ordered chunks. Deterministic for a given input.
    pub fn chunk(&self, text: &str) -> Vec<ChunkPiece> {
        let mut pieces = Vec::new();
        let mut seq_idx = 0u32;

        for section in split_sections(text) {
            for window in self.windows(&section.body) {
                pieces.push(ChunkPiece {
                    title: section.title.clone(),
                    body: window,
                    seq_idx,
                });
                seq_idx += 1;
            }
        }

        pieces
    }

    /// Whitespace-token windows of ~target_tokens with overlap carry-over.
    fn windows(&self, body: &str) -> Vec<String> {
        let words: Vec<&str> = body.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.target_tokens).min(words.len());
            out.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start = end - self.overlap;
        }
        out
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(350, 60)
    }
}

struct Section {
    title: String,
    body: String,
}

/// Heuristic heading detection: markdown `#` headings, numbered headings
/// ("2.1 Escalation paths"), and short ALL-CAPS lines each open a new
/// section. Text before the first heading forms an untitled section.
fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_title = String::new();
    let mut current_body = String::new();

    let mut flush = |title: &str, body: &mut String, sections: &mut Vec<Section>| {
        if !body.trim().is_empty() {
            sections.push(Section {
                title: title.to_string(),
                body: std::mem::take(body),
            });
        } else {
            body.clear();
        }
    };

    for line in text.lines() {
        if let Some(title) = heading_title(line) {
            flush(&current_title, &mut current_body, &mut sections);
            current_title = title;
        } else {
            current_body.push_str(line);
            current_body.push('\n');
        }
    }
    flush(&current_title, &mut current_body, &mut sections);

    sections
}

fn heading_title(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 120 {
        return None;
    }

    if let Some(caps) = MARKDOWN_HEADING_RE.captures(trimmed) {
        return Some(caps[1].trim().to_string());
    }

    let word_count = trimmed.split_whitespace().count();
    if word_count <= 10 && NUMBERED_HEADING_RE.is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    // Short shouting lines ("ESCALATION MATRIX") read as headings in the
    // enterprise corpora this serves.
    if word_count <= 8
        && trimmed.len() >= 3
        && trimmed.chars().any(|c| c.is_ascii_uppercase())
        && !trimmed.chars().any(|c| c.is_lowercase())
    {
        return Some(trimmed.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_small_section() {
        let chunker = Chunker::new(50, 10);
        let pieces = chunker.chunk("just a short paragraph of text");
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].seq_idx, 0);
        assert_eq!(pieces[0].title, "");
        assert_eq!(pieces[0].body, "just a short paragraph of text");
    }

    #[test]
    fn test_markdown_headings_open_sections() {
        let text = "intro text\n# Refunds\nrefund body\n## Escalation\nescalation body";
        let pieces = Chunker::new(100, 10).chunk(text);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].title, "");
        assert_eq!(pieces[1].title, "Refunds");
        assert_eq!(pieces[2].title, "Escalation");
        let seqs: Vec<u32> = pieces.iter().map(|p| p.seq_idx).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_caps_and_numbered_headings() {
        let text = "ESCALATION MATRIX\nbody one\n2.1 Approval Flow\nbody two";
        let pieces = Chunker::new(100, 10).chunk(text);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].title, "ESCALATION MATRIX");
        assert_eq!(pieces[1].title, "2.1 Approval Flow");
    }

    #[test]
    fn test_windows_overlap() {
        let words: Vec<String> = (0..25).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let pieces = Chunker::new(10, 3).chunk(&text);
        // Windows: [0..10), [7..17), [14..24), [21..25)
        assert_eq!(pieces.len(), 4);
        assert!(pieces[0].body.ends_with("w9"));
        assert!(pieces[1].body.starts_with("w7"));
        assert!(pieces[3].body.ends_with("w24"));
    }

    #[test]
    fn test_empty_bodies_dropped() {
        let text = "# Title Only\n\n# Another\ncontent";
        let pieces = Chunker::new(100, 10).chunk(text);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].title, "Another");
    }

    #[test]
    fn test_deterministic() {
        let text = "# A\none two three\n# B\nfour five six";
        let chunker = Chunker::new(2, 1);
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
    }

    #[test]
    fn test_blank_document_yields_nothing() {
        assert!(Chunker::default().chunk("   \n\n  ").is_empty());
    }
}
