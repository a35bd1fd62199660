//! Text extraction behind the `TextSource` seam.
//!
//! The ingest pipeline only ever sees plain text; how a format yields that
//! text is a per-extension concern. Failures here are per-file: the
//! orchestrator logs and skips, never aborts.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// A loader for one family of file formats.
pub trait TextSource: Send + Sync {
    /// Lowercase extensions (without dot) this source handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract the full plain text of the file.
    fn load(&self, path: &Path) -> Result<String>;
}

/// Dispatches a file to the first source claiming its extension.
pub struct SourceRegistry {
    sources: Vec<Box<dyn TextSource>>,
}

impl SourceRegistry {
    /// Registry with the built-in loaders: plain text, PDF, DOCX.
    pub fn with_defaults() -> Self {
        Self {
            sources: vec![
                Box::new(PlainTextSource),
                Box::new(PdfSource),
                Box::new(DocxSource),
            ],
        }
    }

    pub fn supports(&self, extension: &str) -> bool {
        let ext = extension.to_lowercase();
        self.sources.iter().any(|s| s.extensions().contains(&ext.as_str()))
    }

    pub fn load(&self, path: &Path) -> Result<String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let source = self
            .sources
            .iter()
            .find(|s| s.extensions().contains(&ext.as_str()))
            .with_context(|| format!("No text source for extension '{ext}'"))?;

        source.load(path)
    }
}

pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md"]
    }

    fn load(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read text file: {}", path.display()))?;
        // Tolerate stray non-UTF8 bytes rather than skipping the whole file.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub struct PdfSource;

impl TextSource for PdfSource {
    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn load(&self, path: &Path) -> Result<String> {
        pdf_extract::extract_text(path)
            .with_context(|| format!("Failed to extract PDF text: {}", path.display()))
    }
}

pub struct DocxSource;

impl TextSource for DocxSource {
    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn load(&self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open DOCX: {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("Failed to read DOCX as ZIP: {}", path.display()))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .with_context(|| format!("DOCX missing word/document.xml: {}", path.display()))?
            .read_to_string(&mut xml)
            .context("Failed to read document.xml from DOCX")?;

        Ok(extract_docx_text(&xml))
    }
}

/// Pull paragraph text out of WordprocessingML: each `<w:p>` becomes a line,
/// composed of its `<w:t>` run contents.
fn extract_docx_text(xml: &str) -> String {
    let mut result = String::new();

    for paragraph in xml.split("<w:p").skip(1) {
        // A longer tag name ("<w:pPr", "<w:pgSz") also splits here; real
        // paragraph tags continue with '>' or an attribute list.
        if !paragraph.starts_with('>') && !paragraph.starts_with(' ') {
            continue;
        }
        let paragraph = match paragraph.find("</w:p>") {
            Some(end) => &paragraph[..end],
            None => paragraph,
        };

        let mut para_text = String::new();
        for run in paragraph.split("<w:t").skip(1) {
            if !run.starts_with('>') && !run.starts_with(' ') {
                continue;
            }
            let Some(tag_close) = run.find('>') else { continue };
            let content = &run[tag_close + 1..];
            let text = match content.find("</w:t>") {
                Some(end) => &content[..end],
                None => content,
            };
            para_text.push_str(&decode_xml_entities(text));
        }

        if !para_text.is_empty() {
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(&para_text);
        }
    }

    result
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
