use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration, loaded from a single YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub lexical: LexicalConfig,
    #[serde(default)]
    pub neighbors: NeighborConfig,
    pub embedder: EmbedderConfig,
    pub collections: Vec<CollectionConfig>,
    #[serde(default)]
    pub roots: Vec<RootConfig>,
    #[serde(default)]
    pub chunk: ChunkConfig,
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    #[serde(default = "default_max_mb")]
    pub max_mb: u64,
    #[serde(default)]
    pub stopwords: StopwordsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// LanceDB connection URI (a local directory for embedded deployments).
    pub uri: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { uri: "data/vector".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// Parent directory; each app gets `dir/<app>/`.
    pub dir: PathBuf,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("data/lexical") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Parent directory for the per-app neighbor side-indexes.
    pub dir: PathBuf,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("data/neighbors") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Path to the tfidf+svd artifact file.
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub app: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootConfig {
    pub path: PathBuf,
    pub app: String,
    /// Hierarchy level names, matched against directory components under
    /// `path` (e.g. `["module", "submodule"]`).
    #[serde(default)]
    pub hierarchy: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { tokens: 350, overlap: 60 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopwordsConfig {
    #[serde(default)]
    pub extra: Vec<String>,
    #[serde(default)]
    pub domain: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    /// Pause between vector-store batch writes, bounding backend throughput.
    pub batch_pause_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { batch_size: 256, batch_pause_ms: 50 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub adapter_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { adapter_timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:8091".to_string() }
    }
}

fn default_include_extensions() -> Vec<String> {
    vec![".txt".into(), ".md".into(), ".pdf".into(), ".docx".into()]
}

fn default_max_mb() -> u64 {
    25
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject clearly broken configurations before any index is touched.
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            anyhow::bail!("config must declare at least one collection");
        }
        if self.chunk.tokens == 0 {
            anyhow::bail!("chunk.tokens must be > 0");
        }
        if self.chunk.overlap >= self.chunk.tokens {
            anyhow::bail!("chunk.overlap must be < chunk.tokens");
        }
        if self.max_mb == 0 {
            anyhow::bail!("max_mb must be > 0");
        }
        if self.ingest.batch_size == 0 {
            anyhow::bail!("ingest.batch_size must be > 0");
        }
        let apps: HashMap<&str, &str> = self
            .collections
            .iter()
            .map(|c| (c.app.as_str(), c.name.as_str()))
            .collect();
        for root in &self.roots {
            if !apps.contains_key(root.app.as_str()) {
                anyhow::bail!(
                    "root '{}' references app '{}' with no collection",
                    root.path.display(),
                    root.app
                );
            }
        }
        Ok(())
    }

    /// Collection name for an app (apps and collections map 1:1).
    pub fn collection_for_app(&self, app: &str) -> Option<&str> {
        self.collections
            .iter()
            .find(|c| c.app == app)
            .map(|c| c.name.as_str())
    }

    pub fn roots_for_app(&self, app: &str) -> Vec<&RootConfig> {
        self.roots.iter().filter(|r| r.app == app).collect()
    }

    pub fn lexical_dir_for_app(&self, app: &str) -> PathBuf {
        self.lexical.dir.join(app)
    }

    pub fn neighbor_path_for_app(&self, app: &str) -> PathBuf {
        self.neighbors.dir.join(format!("{app}.json"))
    }

    /// Case-insensitive extension allow-list check; accepts entries with or
    /// without the leading dot.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.include_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').to_lowercase() == ext)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
embedder:
  artifact: models/tfidf_svd_384.bin
collections:
  - name: claims_docs
    app: claims
roots:
  - path: /corpus/claims
    app: claims
    hierarchy: [module, submodule]
chunk:
  tokens: 300
  overlap: 40
include_extensions: [".txt", ".md"]
max_mb: 10
"#;

    #[test]
    fn test_parse_sample_yaml() {
        let config: EngineConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.collection_for_app("claims"), Some("claims_docs"));
        assert_eq!(config.chunk.tokens, 300);
        assert_eq!(config.roots_for_app("claims").len(), 1);
        assert_eq!(config.roots[0].hierarchy, vec!["module", "submodule"]);
        // Defaults fill in unspecified sections.
        assert_eq!(config.ingest.batch_size, 256);
        assert_eq!(config.ingest.batch_pause_ms, 50);
        assert_eq!(config.server.bind, "127.0.0.1:8091");
    }

    #[test]
    fn test_extension_allow_list() {
        let config: EngineConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(config.extension_allowed("txt"));
        assert!(config.extension_allowed("MD"));
        assert!(!config.extension_allowed("pdf"));
    }

    #[test]
    fn test_validate_rejects_orphan_root() {
        let mut config: EngineConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.roots[0].app = "fraud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap_ge_tokens() {
        let mut config: EngineConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.chunk.overlap = config.chunk.tokens;
        assert!(config.validate().is_err());
    }
}
