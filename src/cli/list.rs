use anyhow::Result;

use xmemory::config::XMemoryConfig;
use xmemory::memory::{MemoryFilters, MemoryType, SortBy};
use xmemory::store::query::SortOrder;

/// Print one page of memories, newest first.
pub async fn list(
    config: &XMemoryConfig,
    user: Option<&str>,
    memory_type: Option<MemoryType>,
    page: usize,
    page_size: usize,
) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    let filters = MemoryFilters {
        user_id: user.map(str::to_string),
        memory_type,
        ..Default::default()
    };
    let result = repo
        .list_memories(&filters, page, page_size, SortBy::CreatedAt, SortOrder::Desc)
        .await?;

    if result.items.is_empty() {
        println!("No memories.");
        return Ok(());
    }

    println!(
        "Page {}/{} ({} memories)\n",
        result.page,
        result.total_pages(),
        result.total
    );
    let offset = (result.page - 1) * result.page_size;
    for (i, doc) in result.items.iter().enumerate() {
        super::print_entry(offset + i + 1, doc, None);
    }
    Ok(())
}
