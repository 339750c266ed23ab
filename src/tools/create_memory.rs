use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateMemoryParams {
    #[schemars(description = "The natural language content of the memory")]
    pub content: String,

    #[schemars(description = "Owner of the memory")]
    pub user_id: String,

    #[schemars(
        description = "Memory type: raw, insight, project, task, diary, weekly, monthly, quarterly, yearly, archived"
    )]
    pub memory_type: String,

    #[schemars(description = "Free-form labels")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Short title; boosted in keyword search")]
    pub title: Option<String>,

    #[schemars(description = "Short preview. For tasks, the task status")]
    pub summary: Option<String>,

    #[schemars(description = "Id of the parent memory, e.g. the project a task belongs to")]
    pub parent_id: Option<String>,

    #[schemars(description = "Ids of related memories")]
    pub related_ids: Option<Vec<String>>,
}
