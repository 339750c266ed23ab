//! MCP `update_memory` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `update_memory` MCP tool.
///
/// Unset fields keep their stored value. Owner and type cannot be changed.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMemoryParams {
    #[schemars(description = "Id of the memory to update")]
    pub id: String,

    /// New content; the memory is re-embedded when it changes.
    #[schemars(description = "Replacement content. The memory is re-embedded when this changes.")]
    pub content: Option<String>,

    #[schemars(description = "Replacement title")]
    pub title: Option<String>,

    #[schemars(description = "Replacement summary (task status for tasks)")]
    pub summary: Option<String>,

    #[schemars(description = "Replacement tag list")]
    pub tags: Option<Vec<String>>,

    #[schemars(description = "Replacement parent id")]
    pub parent_id: Option<String>,

    #[schemars(description = "Replacement list of related memory ids")]
    pub related_ids: Option<Vec<String>>,
}
