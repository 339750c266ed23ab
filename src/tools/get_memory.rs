use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetMemoryParams {
    #[schemars(description = "Id of the memory to fetch")]
    pub id: String,
}
