use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::orchestrator::SessionInput;
use crate::types::{Message, Role};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MessageParams {
    #[schemars(description = "Who wrote the message: 'user', 'assistant' or 'system'")]
    pub role: String,

    #[schemars(description = "Message text")]
    pub content: String,

    #[schemars(description = "Optional RFC 3339 timestamp")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IngestSessionParams {
    #[schemars(
        description = "Caller-chosen session id (letters, digits, '-', '_', '.'; max 128 bytes)"
    )]
    pub id: String,

    #[schemars(
        description = "Messages to append, oldest first. Send only messages not ingested before; an existing session may be sent an empty list to refresh its summary."
    )]
    pub messages: Vec<MessageParams>,

    #[schemars(description = "Optional channel the conversation happened on")]
    pub channel: Option<String>,

    #[schemars(description = "Optional id of the user in the conversation")]
    pub user_id: Option<String>,
}

impl IngestSessionParams {
    pub fn into_input(self) -> Result<SessionInput, String> {
        let messages = self
            .messages
            .into_iter()
            .map(|m| {
                Ok(Message {
                    role: m.role.parse::<Role>()?,
                    content: m.content,
                    timestamp: m.timestamp,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(SessionInput {
            id: self.id,
            messages,
            channel: self.channel,
            user_id: self.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_is_rejected() {
        let params = IngestSessionParams {
            id: "s1".into(),
            messages: vec![MessageParams {
                role: "robot".into(),
                content: "beep".into(),
                timestamp: None,
            }],
            channel: None,
            user_id: None,
        };
        assert!(params.into_input().unwrap_err().contains("robot"));
    }
}
