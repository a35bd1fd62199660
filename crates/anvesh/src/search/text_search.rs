//! Tantivy-backed lexical index, one directory per app.
//!
//! The schema keeps `id` as STRING (indexed, untokenized) so id lookups and
//! deletions behave; `text` and `title` are BM25-ranked TEXT fields. Queries
//! are built programmatically rather than through the query parser: base
//! tokens are soft SHOULD clauses, required tokens and phrases are MUST.

use std::path::Path;

use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::{AllQuery, BooleanQuery, Occur, PhraseQuery, Query, TermQuery};
use tantivy::schema::{self, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

/// One document staged for the lexical index.
#[derive(Debug, Clone)]
pub struct LexicalDoc {
    pub doc_id: String,
    pub title: String,
    pub text: String,
    pub source: String,
}

/// The boolean query shape for one sparse search: soft base tokens, required
/// tokens, and required phrases with a proximity slop.
#[derive(Debug, Clone, Default)]
pub struct LexicalQueryPlan {
    pub base_tokens: Vec<String>,
    pub must_tokens: Vec<String>,
    pub phrases: Vec<Vec<String>>,
    pub proximity: u32,
}

impl LexicalQueryPlan {
    pub fn is_empty(&self) -> bool {
        self.base_tokens.is_empty() && self.must_tokens.is_empty() && self.phrases.is_empty()
    }
}

pub struct TextSearch {
    reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
    id_field: schema::Field,
    text_field: schema::Field,
    title_field: schema::Field,
    source_field: schema::Field,
}

impl TextSearch {
    fn build_schema() -> (Schema, schema::Field, schema::Field, schema::Field, schema::Field) {
        let mut sb = Schema::builder();
        let id_field = sb.add_text_field("id", STRING | STORED);
        let text_field = sb.add_text_field("text", TEXT);
        let title_field = sb.add_text_field("title", TEXT);
        let source_field = sb.add_text_field("source", STRING | STORED);
        (sb.build(), id_field, text_field, title_field, source_field)
    }

    /// Open the index at `dir`, creating it if absent.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index dir: {}", dir.display()))?;

        let (schema, id_field, text_field, title_field, source_field) = Self::build_schema();

        let mmap = tantivy::directory::MmapDirectory::open(dir)?;
        let index = if Index::exists(&mmap)? {
            Index::open_in_dir(dir)?
        } else {
            Index::create_in_dir(dir, schema)?
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create Tantivy reader")?;

        let writer = index
            .writer(50_000_000)
            .context("Failed to create Tantivy writer")?;

        Ok(Self {
            reader,
            writer: parking_lot::Mutex::new(writer),
            id_field,
            text_field,
            title_field,
            source_field,
        })
    }

    pub fn index_batch(&self, docs: &[LexicalDoc]) -> Result<()> {
        let writer = self.writer.lock();
        for d in docs {
            writer.add_document(doc!(
                self.id_field => d.doc_id.as_str(),
                self.text_field => d.text.as_str(),
                self.title_field => d.title.as_str(),
                self.source_field => d.source.as_str(),
            ))?;
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.commit().context("Tantivy commit failed")?;
        self.reader.reload()?;
        Ok(())
    }

    /// BM25-ranked ids for a query plan, best first.
    pub fn search_ranked(&self, plan: &LexicalQueryPlan, limit: usize) -> Result<Vec<(String, f32)>> {
        let searcher = self.reader.searcher();
        let query = self.build_query(plan);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(addr)?;
            if let Some(id) = retrieved.get_first(self.id_field).and_then(|v| v.as_str()) {
                results.push((id.to_string(), score));
            }
        }
        Ok(results)
    }

    fn build_query(&self, plan: &LexicalQueryPlan) -> Box<dyn Query> {
        if plan.is_empty() {
            return Box::new(AllQuery);
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for token in &plan.base_tokens {
            clauses.push((Occur::Should, self.term_query(token)));
        }
        for token in &plan.must_tokens {
            clauses.push((Occur::Must, self.term_query(token)));
        }
        for phrase in &plan.phrases {
            match phrase.len() {
                0 => {}
                1 => clauses.push((Occur::Must, self.term_query(&phrase[0]))),
                _ => {
                    let terms: Vec<Term> = phrase
                        .iter()
                        .map(|t| Term::from_field_text(self.text_field, t))
                        .collect();
                    let mut pq = PhraseQuery::new(terms);
                    pq.set_slop(plan.proximity);
                    clauses.push((Occur::Must, Box::new(pq)));
                }
            }
        }

        Box::new(BooleanQuery::new(clauses))
    }

    fn term_query(&self, token: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.text_field, token),
            IndexRecordOption::WithFreqsAndPositions,
        ))
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.reader.searcher().num_docs() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(docs: &[(&str, &str)]) -> (tempfile::TempDir, TextSearch) {
        let dir = tempfile::tempdir().unwrap();
        let search = TextSearch::open(dir.path()).unwrap();
        let batch: Vec<LexicalDoc> = docs
            .iter()
            .map(|(id, text)| LexicalDoc {
                doc_id: id.to_string(),
                title: String::new(),
                text: text.to_string(),
                source: "/docs/test.md".to_string(),
            })
            .collect();
        search.index_batch(&batch).unwrap();
        search.commit().unwrap();
        (dir, search)
    }

    #[test]
    fn test_base_tokens_rank_matching_docs() {
        let (_dir, search) = indexed(&[
            ("h:1", "refund escalation requires supervisor approval"),
            ("h:2", "unrelated onboarding checklist for new hires"),
        ]);
        let plan = LexicalQueryPlan {
            base_tokens: vec!["refund".into(), "escalation".into()],
            ..Default::default()
        };
        let hits = search.search_ranked(&plan, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "h:1");
    }

    #[test]
    fn test_must_token_excludes_non_matching() {
        let (_dir, search) = indexed(&[
            ("h:1", "refund escalation requires supervisor approval"),
            ("h:2", "refund workflow for small amounts"),
        ]);
        let plan = LexicalQueryPlan {
            base_tokens: vec!["refund".into()],
            must_tokens: vec!["supervisor".into()],
            ..Default::default()
        };
        let hits = search.search_ranked(&plan, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "h:1");
    }

    #[test]
    fn test_phrase_exact_vs_slop() {
        let (_dir, search) = indexed(&[("h:1", "the supervisor must grant approval today")]);

        let exact = LexicalQueryPlan {
            phrases: vec![vec!["supervisor".into(), "approval".into()]],
            proximity: 0,
            ..Default::default()
        };
        assert!(search.search_ranked(&exact, 10).unwrap().is_empty());

        let sloppy = LexicalQueryPlan {
            phrases: vec![vec!["supervisor".into(), "approval".into()]],
            proximity: 2,
            ..Default::default()
        };
        let hits = search.search_ranked(&sloppy, 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_empty_plan_matches_all() {
        let (_dir, search) = indexed(&[("h:1", "alpha"), ("h:2", "beta")]);
        let plan = LexicalQueryPlan::default();
        let hits = search.search_ranked(&plan, 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_limit_respected() {
        let (_dir, search) = indexed(&[
            ("h:1", "refund one"),
            ("h:2", "refund two"),
            ("h:3", "refund three"),
        ]);
        let plan = LexicalQueryPlan {
            base_tokens: vec!["refund".into()],
            ..Default::default()
        };
        let hits = search.search_ranked(&plan, 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_reopen_preserves_documents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let search = TextSearch::open(dir.path()).unwrap();
            search
                .index_batch(&[LexicalDoc {
                    doc_id: "h:1".into(),
                    title: "Refunds".into(),
                    text: "refund escalation".into(),
                    source: "/docs/a.md".into(),
                }])
                .unwrap();
            search.commit().unwrap();
        }
        let reopened = TextSearch::open(dir.path()).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
