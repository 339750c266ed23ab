use anyhow::{bail, Result};

use xmemory::config::XMemoryConfig;

/// Delete one memory (and its mirror file).
pub async fn delete(config: &XMemoryConfig, id: &str) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    if !repo.delete_memory(id).await {
        bail!("memory {id} not found");
    }
    println!("Deleted {id}.");
    Ok(())
}
