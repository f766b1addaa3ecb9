use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::orchestrator::NoteInput;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteParams {
    #[schemars(description = "Single-line note title")]
    pub title: String,

    #[schemars(description = "Note body (markdown)")]
    pub content: String,

    #[schemars(description = "Optional tags; no commas or newlines")]
    pub tags: Option<Vec<String>>,
}

impl From<WriteParams> for NoteInput {
    fn from(params: WriteParams) -> Self {
        Self {
            title: params.title,
            content: params.content,
            tags: params.tags.unwrap_or_default(),
        }
    }
}
