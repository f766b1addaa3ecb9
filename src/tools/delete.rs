use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteParams {
    #[schemars(
        description = "Id of the session or note to delete. The record stays readable by id but leaves search results."
    )]
    pub id: String,
}
