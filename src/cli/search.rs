use anyhow::Result;

use xmemory::config::XMemoryConfig;
use xmemory::memory::MemoryFilters;

/// Run a similarity search from the terminal.
pub async fn search(config: &XMemoryConfig, query: &str, user: Option<&str>, k: Option<usize>) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    let mut filters = MemoryFilters::new();
    filters.user_id = user.map(str::to_string);
    let k = k.unwrap_or(config.retrieval.default_k);

    let hits = repo.search_by_similarity(query, &filters, k).await?;
    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        super::print_entry(i + 1, &hit.source, hit.score);
    }
    Ok(())
}
