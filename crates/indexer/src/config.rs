//! `StackSettings`: the TOML configuration shared by the indexer and the CLI.
//!
//! Every field has a default, so a missing file is a valid configuration.
//! `CODESTACK_HOME` moves the default home (`~/.codestack`) and
//! `CODESTACK_CONFIG` points at a different config file.

use crate::error::{IndexerError, Result};
use codestack_code_chunker::{
    ChunkerConfig, Language, DEFAULT_CHARS_PER_TOKEN, DEFAULT_MAX_CHUNK_TOKENS,
    DEFAULT_MIN_CHUNK_TOKENS,
};
use codestack_vector_store::EmbeddingModelKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const HOME_ENV: &str = "CODESTACK_HOME";
pub const CONFIG_ENV: &str = "CODESTACK_CONFIG";

const DEFAULT_EXCLUDE_PATHS: &[&str] = &[
    "node_modules",
    "vendor",
    "dist",
    "build",
    ".git",
    "__pycache__",
    "venv",
    "env",
    "target",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            min_tokens: DEFAULT_MIN_CHUNK_TOKENS,
            max_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ChunkingSettings {
    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            min_chunk_tokens: self.min_tokens,
            max_chunk_tokens: self.max_tokens,
            chars_per_token: self.chars_per_token,
            ..ChunkerConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub batch_size: usize,
    pub max_concurrent_files: usize,
    pub max_concurrent_repos: usize,
    /// Empty means every detected language.
    pub languages: Vec<Language>,
    pub exclude_paths: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub respect_gitignore: bool,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_concurrent_files: 16,
            max_concurrent_repos: 2,
            languages: Vec::new(),
            exclude_paths: DEFAULT_EXCLUDE_PATHS.iter().map(|s| (*s).to_string()).collect(),
            exclude_globs: Vec::new(),
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySettings {
    pub org_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Identifier feature hashing; offline and deterministic.
    #[default]
    Hashing,
    /// Local transformer model; needs the `fastembed` build feature.
    Fastembed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Width of hashed vectors. Model providers use the model's own width.
    pub dimension: usize,
    pub model: EmbeddingModelKind,
    /// Where model weights are cached (default: `<state_dir>/models`).
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimension: codestack_vector_store::DEFAULT_DIMENSION,
            model: EmbeddingModelKind::default(),
            cache_dir: None,
        }
    }
}

impl EmbeddingSettings {
    /// Length of the vectors the configured provider produces.
    #[must_use]
    pub const fn output_dimension(&self) -> usize {
        match self.provider {
            EmbeddingProvider::Hashing => self.dimension,
            EmbeddingProvider::Fastembed => self.model.dimension(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub lock_timeout_ms: u64,
    pub stale_lock_ms: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            stale_lock_ms: 30_000,
        }
    }
}

impl CatalogSettings {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    #[must_use]
    pub const fn stale_lock(&self) -> Duration {
        Duration::from_millis(self.stale_lock_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    /// Base for the default catalog and state locations. Not read from the
    /// file; set by the loader.
    #[serde(skip)]
    pub home: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub clone_dir: Option<PathBuf>,
    pub chunking: ChunkingSettings,
    pub indexing: IndexingSettings,
    pub dependencies: DependencySettings,
    pub embedding: EmbeddingSettings,
    pub catalog: CatalogSettings,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self::with_home(Self::default_home())
    }
}

impl StackSettings {
    /// Defaults rooted at `home`.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            catalog_path: None,
            state_dir: None,
            clone_dir: None,
            chunking: ChunkingSettings::default(),
            indexing: IndexingSettings::default(),
            dependencies: DependencySettings::default(),
            embedding: EmbeddingSettings::default(),
            catalog: CatalogSettings::default(),
        }
    }

    #[must_use]
    pub fn default_home() -> PathBuf {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".codestack")
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(path);
        }
        Self::default_home().join("config.toml")
    }

    /// Load settings. An explicit `path` must exist; the default location may
    /// be absent, in which case defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let home = Self::default_home();
        let (config_path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_config_path(), false),
        };

        if !config_path.exists() {
            if required {
                return Err(IndexerError::Config(format!(
                    "config file not found: {}",
                    config_path.display()
                )));
            }
            log::debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::with_home(home));
        }

        let content = std::fs::read_to_string(&config_path)?;
        let settings = Self::from_toml_str(&content, home).map_err(|e| match e {
            IndexerError::Config(reason) => {
                IndexerError::Config(format!("{}: {reason}", config_path.display()))
            }
            other => other,
        })?;
        log::debug!("Loaded settings from {}", config_path.display());
        Ok(settings)
    }

    pub fn from_toml_str(content: &str, home: impl Into<PathBuf>) -> Result<Self> {
        let mut settings: Self =
            toml::from_str(content).map_err(|e| IndexerError::Config(e.to_string()))?;
        settings.home = home.into();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.chunker_config().validate()?;
        if self.indexing.batch_size == 0 {
            return Err(IndexerError::Config("indexing.batch_size must be > 0".into()));
        }
        if self.indexing.max_concurrent_files == 0 || self.indexing.max_concurrent_repos == 0 {
            return Err(IndexerError::Config(
                "indexing concurrency limits must be > 0".into(),
            ));
        }
        if self.embedding.output_dimension() == 0 {
            return Err(IndexerError::Config("embedding.dimension must be > 0".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .as_deref()
            .map_or_else(|| self.home.join("stack.json"), expand_home)
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .as_deref()
            .map_or_else(|| self.home.join("state"), expand_home)
    }

    #[must_use]
    pub fn clone_dir(&self) -> PathBuf {
        self.clone_dir.as_deref().map_or_else(
            || {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("Code")
            },
            expand_home,
        )
    }

    #[must_use]
    pub fn vector_store_path(&self) -> PathBuf {
        self.state_dir().join("vectors.json")
    }

    #[must_use]
    pub fn imports_dir(&self) -> PathBuf {
        self.state_dir().join("imports")
    }

    #[must_use]
    pub fn model_cache_dir(&self) -> PathBuf {
        self.embedding
            .cache_dir
            .as_deref()
            .map_or_else(|| self.state_dir().join("models"), expand_home)
    }
}

pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}
