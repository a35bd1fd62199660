//! Explicit per-process retrieval context. Everything the online path needs
//! is constructed once at startup and passed by reference; there are no
//! module-level globals. Indexes are immutable at query time, so the context
//! is freely shared across requests behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::config::EngineConfig;
use crate::embeddings::{Embedder, TfidfSvdEmbedder};
use crate::search::TextSearch;
use crate::storage::{LanceStore, NeighborIndex};
use crate::text::Stoplist;

pub struct RetrievalContext {
    pub config: EngineConfig,
    pub embedder: Arc<dyn Embedder>,
    pub store: LanceStore,
    // Arc so the sparse adapter can hand a searcher to spawn_blocking.
    lexical: HashMap<String, Arc<TextSearch>>,
    neighbors: HashMap<String, NeighborIndex>,
    pub stoplist: Stoplist,
}

impl RetrievalContext {
    /// Build the context for serving: load the embedder artifact, connect the
    /// vector store, and open whatever per-app lexical and neighbor indexes
    /// exist on disk. A missing index is not an error; that signal just
    /// reports unavailable at query time.
    pub async fn initialize(config: EngineConfig) -> Result<Self> {
        let embedder = TfidfSvdEmbedder::load(&config.embedder.artifact)
            .context("Failed to load embedder artifact")?;
        let embedder: Arc<dyn Embedder> = Arc::new(embedder);

        let store = LanceStore::connect(&config.vector.uri, embedder.dimension(), &embedder.tag())
            .await
            .context("Failed to open vector store")?;

        let mut lexical = HashMap::new();
        let mut neighbors = HashMap::new();
        for collection in &config.collections {
            let app = &collection.app;

            let lex_dir = config.lexical_dir_for_app(app);
            if lex_dir.exists() {
                match TextSearch::open(&lex_dir) {
                    Ok(ts) => {
                        lexical.insert(app.clone(), Arc::new(ts));
                    }
                    Err(e) => {
                        tracing::warn!(app = %app, error = %e, "Lexical index unavailable");
                    }
                }
            } else {
                tracing::warn!(app = %app, dir = %lex_dir.display(), "No lexical index on disk");
            }

            let neighbor_path = config.neighbor_path_for_app(app);
            if neighbor_path.exists() {
                match NeighborIndex::load(&neighbor_path) {
                    Ok(idx) => {
                        neighbors.insert(app.clone(), idx);
                    }
                    Err(e) => {
                        tracing::warn!(app = %app, error = %e, "Neighbor index unavailable");
                    }
                }
            }
        }

        let stoplist = Stoplist::new(&config.stopwords.extra, &config.stopwords.domain);

        tracing::info!(
            dimension = embedder.dimension(),
            embedder = %embedder.tag(),
            lexical_apps = lexical.len(),
            neighbor_apps = neighbors.len(),
            "Retrieval context initialized"
        );

        Ok(Self {
            config,
            embedder,
            store,
            lexical,
            neighbors,
            stoplist,
        })
    }

    pub fn lexical_for_app(&self, app: &str) -> Option<Arc<TextSearch>> {
        self.lexical.get(app).cloned()
    }

    pub fn neighbors_for_app(&self, app: &str) -> Option<&NeighborIndex> {
        self.neighbors.get(app)
    }
}
