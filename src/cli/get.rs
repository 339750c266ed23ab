//! CLI `get` command: print one memory as JSON.

use anyhow::{bail, Result};

use xmemory::api::MemoryResponse;
use xmemory::config::XMemoryConfig;

pub async fn get(config: &XMemoryConfig, id: &str) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    let Some(doc) = repo.get_memory(id).await else {
        bail!("memory {id} not found");
    };
    println!("{}", serde_json::to_string_pretty(&MemoryResponse::from(doc))?);
    Ok(())
}
