use anyhow::Result;
use serde::Serialize;

use xmemory::api::MemoryResponse;
use xmemory::config::XMemoryConfig;
use xmemory::memory::{MemoryFilters, SortBy};
use xmemory::store::query::SortOrder;

/// Export format: every memory, oldest first, without vectors.
#[derive(Debug, Serialize)]
struct ExportData {
    index: String,
    memories: Vec<MemoryResponse>,
}

/// Export memories as JSON to stdout.
pub async fn export(config: &XMemoryConfig, user: Option<&str>) -> Result<()> {
    let repo = xmemory::server::setup(config).await?;

    let mut filters = MemoryFilters::new();
    filters.user_id = user.map(str::to_string);
    let page_size = config.retrieval.max_page_size;

    let mut memories = Vec::new();
    let mut page = 1;
    loop {
        let result = repo
            .list_memories(&filters, page, page_size, SortBy::CreatedAt, SortOrder::Asc)
            .await?;
        let done = result.items.len() < page_size
            || (page * page_size) as u64 >= result.total;
        memories.extend(result.items.into_iter().map(MemoryResponse::from));
        if done {
            break;
        }
        page += 1;
    }

    let data = ExportData {
        index: repo.index().to_string(),
        memories,
    };
    println!("{}", serde_json::to_string_pretty(&data)?);
    eprintln!("Exported {} memories.", data.memories.len());

    Ok(())
}
