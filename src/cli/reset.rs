//! CLI `reset` command: drop the memory index after user confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use xmemory::config::XMemoryConfig;

/// Drop the memory index and recreate it empty.
pub async fn reset(config: &XMemoryConfig) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    println!("WARNING: This will permanently delete ALL memories in index {}.", repo.index());
    println!("Backend: {:?}", config.store.backend);
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    repo.repository().delete_index().await?;
    repo.initialize().await?;

    println!("All memories deleted. Index recreated.");
    Ok(())
}
