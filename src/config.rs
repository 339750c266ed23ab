use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Error;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct XMemoryConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// `stdio` or `http`.
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Elasticsearch,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "elasticsearch" | "es" => Ok(Self::Elasticsearch),
            other => Err(Error::Config(format!("unknown store backend: {other}"))),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub index: String,
    /// Directory of the per-user JSON mirror. Empty disables it.
    pub mirror_dir: String,
    /// Offset given to timestamps that carry none, e.g. `+08:00`.
    pub utc_offset: String,
    pub sqlite: SqliteConfig,
    pub elasticsearch: ElasticsearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SqliteConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `openai` or `hash`.
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub api_base: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub num_candidates_multiplier: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub interval_secs: u64,
    pub error_backoff_secs: u64,
    pub batch_size: usize,
    pub agent_cache_capacity: usize,
    pub agent_cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let mirror_dir = default_xmemory_dir()
            .join("data")
            .join("memories")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: StoreBackend::Sqlite,
            index: "memories".into(),
            mirror_dir,
            utc_offset: "+00:00".into(),
            sqlite: SqliteConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        let db_path = default_xmemory_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".into()],
            username: None,
            password: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            dimension: 1536,
            api_base: "https://api.openai.com".into(),
            api_key: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            num_candidates_multiplier: 10,
            max_page_size: 100,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            error_backoff_secs: 10,
            batch_size: 10,
            agent_cache_capacity: 128,
            agent_cache_ttl_secs: 3600,
        }
    }
}

/// Returns `~/.xmemory/`
pub fn default_xmemory_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".xmemory")
}

/// Returns the default config file path: `~/.xmemory/config.toml`
pub fn default_config_path() -> PathBuf {
    default_xmemory_dir().join("config.toml")
}

impl XMemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            XMemoryConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `XMEMORY_*` environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("XMEMORY_DB") {
            self.store.sqlite.db_path = val;
        }
        if let Ok(val) = std::env::var("XMEMORY_BACKEND") {
            self.store.backend = val.parse()?;
        }
        if let Ok(val) = std::env::var("XMEMORY_INDEX") {
            self.store.index = val;
        }
        if let Ok(val) = std::env::var("XMEMORY_ES_HOSTS") {
            self.store.elasticsearch.hosts = val
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(val) = std::env::var("XMEMORY_ES_USERNAME") {
            self.store.elasticsearch.username = Some(val);
        }
        if let Ok(val) = std::env::var("XMEMORY_ES_PASSWORD") {
            self.store.elasticsearch.password = Some(val);
        }
        if let Ok(val) = std::env::var("XMEMORY_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(val);
        } else if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if let Ok(val) = std::env::var("XMEMORY_EMBEDDING_API_BASE") {
            self.embedding.api_base = val;
        }
        if let Ok(val) = std::env::var("XMEMORY_LOG_LEVEL") {
            self.server.log_level = val;
        }
        Ok(())
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<(), Error> {
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be > 0".into()));
        }
        crate::memory::dates::parse_utc_offset(&self.store.utc_offset)
            .map_err(|e| Error::Config(format!("store.utc_offset: {e}")))?;
        if self.store.backend == StoreBackend::Elasticsearch && self.store.elasticsearch.hosts.is_empty() {
            return Err(Error::Config("store.elasticsearch.hosts is empty".into()));
        }
        if self.retrieval.max_page_size == 0 || self.worker.batch_size == 0 {
            return Err(Error::Config(
                "retrieval.max_page_size and worker.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the mirror directory, `None` when the mirror is disabled.
    pub fn resolved_mirror_dir(&self) -> Option<PathBuf> {
        let dir = self.store.mirror_dir.trim();
        (!dir.is_empty()).then(|| expand_tilde(dir))
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
