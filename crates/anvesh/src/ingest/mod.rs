//! Offline ingestion: walk the configured roots, extract text, chunk, dedup,
//! embed in batches, and fan out to the vector store, the lexical index, and
//! the neighbor side-index.
//!
//! Indexes are rebuild-on-demand artifacts: per-file failures log and skip,
//! interrupts may leave partial writes, and a full rerun produces identical
//! content for an unchanged corpus.

pub mod dedup;
pub mod hierarchy;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use walkdir::WalkDir;

use crate::config::{CollectionConfig, EngineConfig, RootConfig};
use crate::embeddings::Embedder;
use crate::ingest::dedup::{DedupEngine, DedupOutcome};
use crate::processing::{Chunker, SourceRegistry};
use crate::search::{LexicalDoc, TextSearch};
use crate::storage::{LanceStore, NeighborIndex, StoredChunk};
use crate::text;
use crate::types::{Chunk, ChunkMetadata};

const PREVIEW_CHARS: usize = 600;
const LEXICAL_COMMIT_THRESHOLD: usize = 5000;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestStats {
    pub files: u64,
    pub chunks: u64,
    pub files_skipped: u64,
    pub exact_dups_skipped: u64,
    pub near_dups_skipped: u64,
}

pub struct Ingestor {
    config: EngineConfig,
    embedder: Arc<dyn Embedder>,
    store: LanceStore,
    sources: SourceRegistry,
    chunker: Chunker,
}

impl Ingestor {
    pub async fn new(config: EngineConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let store = LanceStore::connect(&config.vector.uri, embedder.dimension(), &embedder.tag())
            .await
            .context("Failed to open vector store")?;
        let chunker = Chunker::new(config.chunk.tokens, config.chunk.overlap);

        Ok(Self {
            config,
            embedder,
            store,
            sources: SourceRegistry::with_defaults(),
            chunker,
        })
    }

    /// Run the full batch build. Fatal errors (dimension disagreement,
    /// unwritable stores) abort; per-file problems are logged and skipped.
    pub async fn run(&self) -> Result<IngestStats> {
        // Probe the embedder once; every later batch must agree.
        let probe = self.embedder.embed("probe")?;
        if probe.len() != self.store.dimension() {
            anyhow::bail!(
                "Embedder produced dimension {} but the store expects {}",
                probe.len(),
                self.store.dimension()
            );
        }
        tracing::info!(dimension = probe.len(), "Embedder probe ok");

        let mut stats = IngestStats::default();
        // Dedup state spans the whole run so duplicates are suppressed across
        // collections, matching chunk identity being app-independent.
        let mut dedup = DedupEngine::new();

        for collection in &self.config.collections {
            self.ingest_collection(collection, &mut dedup, &mut stats)
                .await?;
        }

        tracing::info!(
            files = stats.files,
            chunks = stats.chunks,
            exact_skipped = stats.exact_dups_skipped,
            near_skipped = stats.near_dups_skipped,
            "Ingestion complete"
        );
        Ok(stats)
    }

    async fn ingest_collection(
        &self,
        collection: &CollectionConfig,
        dedup: &mut DedupEngine,
        stats: &mut IngestStats,
    ) -> Result<()> {
        let roots = self.config.roots_for_app(&collection.app);
        if roots.is_empty() {
            tracing::warn!(app = %collection.app, "No roots configured, skipping collection");
            return Ok(());
        }

        tracing::info!(collection = %collection.name, app = %collection.app, "Building collection");
        self.store
            .ensure_collection(&collection.name)
            .await
            .with_context(|| format!("Failed to prepare collection '{}'", collection.name))?;

        let lexical = TextSearch::open(&self.config.lexical_dir_for_app(&collection.app))
            .with_context(|| format!("Failed to open lexical index for '{}'", collection.app))?;

        let mut neighbor_index = NeighborIndex::new();
        let mut staged_lexical: Vec<LexicalDoc> = Vec::new();

        for root in roots {
            tracing::info!(path = %root.path.display(), "Walking root");
            for entry in WalkDir::new(&root.path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if !self.wants_file(path, &entry) {
                    continue;
                }

                match self
                    .ingest_file(path, root, collection, dedup, &mut neighbor_index, &mut staged_lexical)
                    .await
                {
                    Ok(0) => {}
                    Ok(n) => {
                        stats.files += 1;
                        stats.chunks += n as u64;
                        tracing::info!(chunks = n, path = %path.display(), "Indexed file");
                    }
                    Err(e) => {
                        stats.files_skipped += 1;
                        tracing::warn!(path = %path.display(), error = %e, "Skipping file");
                    }
                }

                if staged_lexical.len() >= LEXICAL_COMMIT_THRESHOLD {
                    lexical.index_batch(&staged_lexical)?;
                    lexical.commit()?;
                    tracing::info!(docs = staged_lexical.len(), "Lexical batch committed");
                    staged_lexical.clear();
                }
            }
        }

        if !staged_lexical.is_empty() {
            lexical.index_batch(&staged_lexical)?;
            lexical.commit()?;
            tracing::info!(docs = staged_lexical.len(), "Lexical batch committed");
        }

        if !neighbor_index.is_empty() {
            let path = self.config.neighbor_path_for_app(&collection.app);
            neighbor_index.save(&path)?;
            tracing::info!(entries = neighbor_index.len(), path = %path.display(), "Neighbor index written");
        }

        stats.exact_dups_skipped = dedup.exact_skipped;
        stats.near_dups_skipped = dedup.near_skipped;
        Ok(())
    }

    fn wants_file(&self, path: &Path, entry: &walkdir::DirEntry) -> bool {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.config.extension_allowed(ext) || !self.sources.supports(ext) {
            return false;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() > self.config.max_bytes() => {
                tracing::info!(path = %path.display(), max_mb = self.config.max_mb, "Skipping oversized file");
                false
            }
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Chunk, dedup, embed, and stage one file. Returns retained chunk count.
    async fn ingest_file(
        &self,
        path: &Path,
        root: &RootConfig,
        collection: &CollectionConfig,
        dedup: &mut DedupEngine,
        neighbor_index: &mut NeighborIndex,
        staged_lexical: &mut Vec<LexicalDoc>,
    ) -> Result<usize> {
        let raw = self.sources.load(path)?;
        if raw.trim().is_empty() {
            return Ok(0);
        }

        let pieces = self.chunker.chunk(&raw);
        if pieces.is_empty() {
            return Ok(0);
        }

        let hierarchy = hierarchy::derive_hierarchy(root, path);
        let source_path = path.display().to_string();
        let ingested_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let mut chunks: Vec<Chunk> = Vec::new();
        for piece in pieces {
            let normalized = text::normalize_for_hash(&piece.body);
            let (hash, simhash) = match dedup.check(&normalized) {
                DedupOutcome::Fresh { hash, simhash } => (hash, simhash),
                DedupOutcome::ExactDuplicate
                | DedupOutcome::NearDuplicate
                | DedupOutcome::Empty => continue,
            };

            let preview: String = piece.body.chars().take(PREVIEW_CHARS).collect();
            chunks.push(Chunk {
                cid: format!("h:{hash}"),
                preview,
                metadata: ChunkMetadata {
                    app: collection.app.clone(),
                    source_path: source_path.clone(),
                    section_title: piece.title,
                    seq_idx: piece.seq_idx,
                    ingested_at: ingested_at.clone(),
                    hash,
                    simhash,
                    hierarchy: hierarchy.clone(),
                },
                body: piece.body,
            });
        }

        if chunks.is_empty() {
            return Ok(0);
        }

        // Embed and upload in bounded batches; the pause throttles the vector
        // backend.
        for batch in chunks.chunks(self.config.ingest.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.body.as_str()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            for v in &vectors {
                if v.len() != self.store.dimension() {
                    anyhow::bail!(
                        "Embedding dimension {} disagrees with probe dimension {}",
                        v.len(),
                        self.store.dimension()
                    );
                }
            }

            let rows: Vec<StoredChunk> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| StoredChunk {
                    cid: chunk.cid.clone(),
                    preview: chunk.preview.clone(),
                    metadata: chunk.metadata.clone(),
                    vector,
                })
                .collect();
            self.store.add_chunks(&collection.name, &rows).await?;
            tokio::time::sleep(Duration::from_millis(self.config.ingest.batch_pause_ms)).await;
        }

        for chunk in &chunks {
            staged_lexical.push(LexicalDoc {
                doc_id: chunk.cid.clone(),
                title: chunk.metadata.section_title.clone(),
                text: chunk.body.clone(),
                source: chunk.metadata.source_path.clone(),
            });
            neighbor_index.push(&chunk.metadata.source_path, chunk.metadata.seq_idx, &chunk.cid);
        }

        Ok(chunks.len())
    }
}
