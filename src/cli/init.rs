//! CLI `init` command: write a starter config and create the memory index.

use anyhow::{Context, Result};
use std::path::Path;

use xmemory::config::XMemoryConfig;
use xmemory::embedding;

const TEMPLATE: &str = r#"# xmemory configuration. Every key is optional.

[server]
transport = "stdio"   # stdio | http
host = "127.0.0.1"
port = 8000
log_level = "info"

[store]
backend = "sqlite"    # sqlite | elasticsearch
index = "memories"
mirror_dir = "~/.xmemory/data/memories"   # "" disables the file mirror
utc_offset = "+00:00"

[store.sqlite]
db_path = "~/.xmemory/memory.db"

[store.elasticsearch]
hosts = ["http://localhost:9200"]
request_timeout_secs = 30

[embedding]
provider = "openai"   # openai | hash
model = "text-embedding-3-small"
dimension = 1536
api_base = "https://api.openai.com"
# api_key = "sk-..."  # or set XMEMORY_EMBEDDING_API_KEY / OPENAI_API_KEY

[retrieval]
default_k = 10
num_candidates_multiplier = 10
max_page_size = 100

[worker]
interval_secs = 60
error_backoff_secs = 10
batch_size = 10
"#;

/// Write `config_path` unless it exists, then set up the index.
pub async fn init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        // the template's provider must be usable before anything is written
        check_embedding(&XMemoryConfig::load_from(config_path)?)?;
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        std::fs::write(config_path, TEMPLATE)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    let config = XMemoryConfig::load_from(config_path)?;
    let repo = xmemory::server::setup(&config).await?;
    println!("Index {} ready ({:?} backend).", repo.index(), config.store.backend);
    Ok(())
}

/// Fail early when the configured embedding provider cannot be built.
fn check_embedding(config: &XMemoryConfig) -> Result<()> {
    embedding::create_provider(&config.embedding).map(|_| ()).context(
        "embeddings are not usable: set XMEMORY_EMBEDDING_API_KEY or OPENAI_API_KEY, \
         or write a config with [embedding] provider = \"hash\"",
    )
}

#[cfg(test)]
mod tests {
    use super::{check_embedding, TEMPLATE};
    use xmemory::config::XMemoryConfig;

    #[test]
    fn missing_api_key_fails_before_setup() {
        let mut config: XMemoryConfig = toml::from_str(TEMPLATE).unwrap();
        config.embedding.api_key = None;
        let err = check_embedding(&config).unwrap_err();
        assert!(format!("{err:#}").contains("OPENAI_API_KEY"));

        config.embedding.api_key = Some("sk-test".into());
        check_embedding(&config).unwrap();

        config.embedding.api_key = None;
        config.embedding.provider = "hash".into();
        check_embedding(&config).unwrap();
    }

    #[test]
    fn template_parses_to_defaults() {
        let parsed: XMemoryConfig = toml::from_str(TEMPLATE).unwrap();
        let defaults = XMemoryConfig::default();
        assert_eq!(parsed.store.index, defaults.store.index);
        assert_eq!(parsed.embedding.dimension, defaults.embedding.dimension);
        assert_eq!(parsed.server.port, defaults.server.port);
        assert_eq!(parsed.worker.batch_size, defaults.worker.batch_size);
    }
}
