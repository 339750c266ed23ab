pub mod create_memory;
pub mod get_memory;
pub mod search_memories;
pub mod update_memory;

use create_memory::CreateMemoryParams;
use get_memory::GetMemoryParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_memories::SearchMemoriesParams;
use std::sync::Arc;
use update_memory::UpdateMemoryParams;

use crate::api::MemoryResponse;
use crate::config::XMemoryConfig;
use crate::memory::{MemoryDocument, MemoryFilters, MemoryPatch, MemoryRepository, MemoryType};

/// The xmemory MCP tool handler. This is the surface an enrichment agent uses
/// to read and write memories; every call names its user explicitly.
#[derive(Clone)]
pub struct XMemoryTools {
    tool_router: ToolRouter<Self>,
    repo: MemoryRepository,
    config: Arc<XMemoryConfig>,
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn parse_type(value: &str) -> Result<MemoryType, String> {
    value.parse()
}

#[tool_router]
impl XMemoryTools {
    pub fn new(repo: MemoryRepository, config: Arc<XMemoryConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            repo,
            config,
        }
    }

    /// Semantic search over stored memories.
    #[tool(description = "Find memories similar in meaning to a query. Filter by user_id, memory_type and tags.")]
    async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchMemoriesParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        let mut filters = MemoryFilters::new();
        filters.user_id = params.user_id;
        filters.memory_type = params.memory_type.as_deref().map(parse_type).transpose()?;
        filters.tags = params.tags.unwrap_or_default();
        let max_k = self.config.retrieval.max_page_size.max(1);
        let k = params.k.unwrap_or(self.config.retrieval.default_k).max(1).min(max_k);

        tracing::info!(query_len = params.query.len(), k, "search_memories called");

        let hits = self
            .repo
            .search_by_similarity(&params.query, &filters, k)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        let results: Vec<serde_json::Value> = hits
            .into_iter()
            .map(|hit| {
                serde_json::json!({
                    "score": hit.score,
                    "memory": MemoryResponse::from(hit.source),
                })
            })
            .collect();
        to_json(&serde_json::json!({ "total": results.len(), "memories": results }))
    }

    /// Store a new memory for a user.
    #[tool(description = "Create a memory for a user. Types: raw, insight, project, task, diary, weekly, monthly, quarterly, yearly, archived. Tasks take their project as parent_id and their status as summary.")]
    async fn create_memory(
        &self,
        Parameters(params): Parameters<CreateMemoryParams>,
    ) -> Result<String, String> {
        let memory_type = parse_type(&params.memory_type)?;
        if params.user_id.is_empty() {
            return Err("user_id must not be empty".into());
        }

        let mut doc = MemoryDocument::new(params.content, memory_type, params.user_id)
            .with_tags(params.tags.unwrap_or_default())
            .with_created_at(self.repo.now());
        doc.title = params.title;
        doc.summary = params.summary;
        doc.parent_id = params.parent_id;
        doc.related_ids = params.related_ids.unwrap_or_default();

        tracing::info!(
            memory_type = %memory_type,
            user_id = %doc.user_id,
            "create_memory called"
        );

        let id = self
            .repo
            .create_memory(doc)
            .await
            .map_err(|e| format!("create failed: {e}"))?;
        to_json(&serde_json::json!({ "id": id, "status": "created" }))
    }

    /// Change fields of an existing memory.
    #[tool(description = "Update a memory by id. Only the given fields change; owner and type are fixed. Changing content re-embeds the memory.")]
    async fn update_memory(
        &self,
        Parameters(params): Parameters<UpdateMemoryParams>,
    ) -> Result<String, String> {
        let id = params.id;
        let patch = MemoryPatch {
            content: params.content,
            title: params.title,
            summary: params.summary,
            tags: params.tags,
            parent_id: params.parent_id,
            related_ids: params.related_ids,
        };
        if patch.is_empty() {
            return Err("nothing to update".into());
        }

        tracing::info!(id = %id, content = patch.content.is_some(), "update_memory called");

        match self.repo.edit_memory(&id, patch).await {
            Ok(true) => to_json(&serde_json::json!({ "id": id, "status": "updated" })),
            Ok(false) => Err(format!("memory {id} not found")),
            Err(e) => Err(format!("update failed: {e}")),
        }
    }

    /// Fetch one memory by id.
    #[tool(description = "Get a memory by id, without its embedding.")]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<String, String> {
        tracing::info!(id = %params.id, "get_memory called");
        match self.repo.get_memory(&params.id).await {
            Some(doc) => to_json(&MemoryResponse::from(doc)),
            None => Err(format!("memory {} not found", params.id)),
        }
    }
}

#[tool_handler]
impl ServerHandler for XMemoryTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "xmemory stores personal memories per user. Use search_memories to find related \
                 memories, create_memory and update_memory to record insights, projects and tasks, \
                 and get_memory to read one in full."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hashed::HashEmbeddingProvider;
    use crate::store::sqlite::SqliteStore;
    use crate::store::StoreClient;

    async fn tools() -> XMemoryTools {
        let client = StoreClient::new(SqliteStore::open_in_memory().unwrap());
        let repo = MemoryRepository::new(client, "memories", Arc::new(HashEmbeddingProvider::new(32)));
        repo.initialize().await.unwrap();
        XMemoryTools::new(repo, Arc::new(XMemoryConfig::default()))
    }

    fn create_params(content: &str, memory_type: &str) -> CreateMemoryParams {
        CreateMemoryParams {
            content: content.into(),
            user_id: "u1".into(),
            memory_type: memory_type.into(),
            tags: Some(vec!["coffee".into()]),
            title: None,
            summary: None,
            parent_id: None,
            related_ids: None,
        }
    }

    async fn create(tools: &XMemoryTools, content: &str) -> String {
        let out = tools
            .create_memory(Parameters(create_params(content, "insight")))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        value["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn create_then_get() {
        let tools = tools().await;
        let id = create(&tools, "prefers oat milk in coffee").await;

        let out = tools
            .get_memory(Parameters(GetMemoryParams { id: id.clone() }))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["id"], id.as_str());
        assert_eq!(value["memory_type"], "insight");
        assert!(value.get("embedding").is_none());
    }

    #[tokio::test]
    async fn search_caps_oversized_k() {
        let tools = tools().await;
        create(&tools, "prefers oat milk in coffee").await;

        let out = tools
            .search_memories(Parameters(SearchMemoriesParams {
                query: "oat milk".into(),
                user_id: Some("u1".into()),
                memory_type: None,
                tags: None,
                k: Some(usize::MAX),
            }))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["total"], 1);
    }

    #[tokio::test]
    async fn create_rejects_unknown_type() {
        let tools = tools().await;
        let err = tools
            .create_memory(Parameters(create_params("x", "episodic")))
            .await
            .unwrap_err();
        assert!(err.contains("unknown memory type"));
    }

    #[tokio::test]
    async fn update_reembeds_changed_content() {
        let tools = tools().await;
        let id = create(&tools, "likes tea").await;
        let before = tools.repo.get_memory_with_embedding(&id).await.unwrap();

        tools
            .update_memory(Parameters(UpdateMemoryParams {
                id: id.clone(),
                content: Some("likes espresso".into()),
                title: None,
                summary: Some("drinks".into()),
                tags: None,
                parent_id: None,
                related_ids: None,
            }))
            .await
            .unwrap();

        let after = tools.repo.get_memory_with_embedding(&id).await.unwrap();
        assert_eq!(after.content, "likes espresso");
        assert_eq!(after.summary.as_deref(), Some("drinks"));
        assert_eq!(after.tags, vec!["coffee"]);
        assert_ne!(after.embedding, before.embedding);
    }

    #[tokio::test]
    async fn update_missing_is_an_error() {
        let tools = tools().await;
        let err = tools
            .update_memory(Parameters(UpdateMemoryParams {
                id: "nope".into(),
                content: None,
                title: Some("t".into()),
                summary: None,
                tags: None,
                parent_id: None,
                related_ids: None,
            }))
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn search_filters_by_user() {
        let tools = tools().await;
        create(&tools, "espresso every morning").await;

        let out = tools
            .search_memories(Parameters(SearchMemoriesParams {
                query: "espresso morning".into(),
                user_id: Some("u1".into()),
                memory_type: None,
                tags: None,
                k: Some(5),
            }))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["total"], 1);
        assert!(value["memories"][0]["memory"].get("embedding").is_none());

        let out = tools
            .search_memories(Parameters(SearchMemoriesParams {
                query: "espresso morning".into(),
                user_id: Some("u2".into()),
                memory_type: None,
                tags: None,
                k: None,
            }))
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["total"], 0);
    }
}
