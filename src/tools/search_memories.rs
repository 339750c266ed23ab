//! MCP `search_memories` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_memories` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchMemoriesParams {
    #[schemars(description = "Natural language text to find similar memories for")]
    pub query: String,

    #[schemars(description = "Only return memories owned by this user")]
    pub user_id: Option<String>,

    #[schemars(
        description = "Only return memories of this type: raw, insight, project, task, diary, weekly, monthly, quarterly, yearly, archived"
    )]
    pub memory_type: Option<String>,

    #[schemars(description = "Only return memories carrying at least one of these tags")]
    pub tags: Option<Vec<String>>,

    /// Number of results. Defaults to `retrieval.default_k`.
    #[schemars(description = "Maximum number of results to return")]
    pub k: Option<usize>,
}
