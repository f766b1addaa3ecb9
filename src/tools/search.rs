use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    #[schemars(description = "Natural language query")]
    pub query: String,

    #[schemars(description = "Maximum number of results (default from configuration)")]
    pub limit: Option<usize>,

    #[schemars(description = "Restrict to 'session' or 'memory' results; default 'all'")]
    pub r#type: Option<String>,
}
