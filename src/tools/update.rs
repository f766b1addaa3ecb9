use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::NotePatch;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateParams {
    #[schemars(description = "Id of the note to update")]
    pub id: String,

    #[schemars(description = "New title; omit to keep the current one")]
    pub title: Option<String>,

    #[schemars(description = "New body; omit to keep the current one")]
    pub content: Option<String>,

    #[schemars(description = "Replacement tag list; omit to keep the current tags")]
    pub tags: Option<Vec<String>>,
}

impl UpdateParams {
    pub fn into_parts(self) -> (String, NotePatch) {
        (
            self.id,
            NotePatch {
                title: self.title,
                content: self.content,
                tags: self.tags,
            },
        )
    }
}
