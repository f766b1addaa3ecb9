use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadParams {
    #[schemars(description = "Session id or note id (note ids start with 'mem_')")]
    pub id: String,

    #[schemars(description = "Zero-based chunk of a session to read (default 0). Ignored for notes.")]
    pub chunk: Option<usize>,
}
