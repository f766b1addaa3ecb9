//! Core record type definitions.
//!
//! Defines [`Message`] and [`Role`] (the raw session log), [`SessionMeta`] (the derived
//! per-session record), [`Note`] (agent-written memories), and the result shapes
//! returned by search and read.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s} (expected user, assistant or system)")),
        }
    }
}

/// One line of a session log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// ISO 8601 timestamp supplied by the caller, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// The derived metadata record for a session, overwritten on every ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub key_facts: Vec<String>,
    pub chunk_count: usize,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub deleted: bool,
}

/// An agent-written note. Stored one markdown file per note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

/// Fields a note update may change. `None` keeps the prior value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none()
    }
}

/// Which collection a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Session,
    Memory,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search scope filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    All,
    Session,
    Memory,
}

impl SearchType {
    pub fn includes(&self, kind: EntryKind) -> bool {
        match self {
            Self::All => true,
            Self::Session => kind == EntryKind::Session,
            Self::Memory => kind == EntryKind::Memory,
        }
    }
}

impl std::str::FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "session" | "sessions" => Ok(Self::Session),
            "memory" | "memories" => Ok(Self::Memory),
            _ => Err(format!("unknown search type: {s}")),
        }
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Session summary or note content.
    pub text: String,
    pub score: f64,
    pub chunks: usize,
    /// `updatedAt` of the underlying record.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// The response to a direct read of a session chunk or a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_facts: Option<Vec<String>>,
    pub deleted: bool,
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp, used to validate caller-supplied and stored times.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_without_missing_timestamp() {
        let msg = Message::new(Role::Assistant, "hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hello"}"#);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result: Result<Message, _> =
            serde_json::from_str(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn session_meta_uses_camel_case() {
        let meta = SessionMeta {
            id: "s1".into(),
            summary: "sum".into(),
            key_facts: vec!["fact".into()],
            chunk_count: 1,
            message_count: 2,
            channel: None,
            user_id: Some("u1".into()),
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: "2026-01-01T00:00:00.000Z".into(),
            deleted: false,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["chunkCount"], 1);
        assert_eq!(value["messageCount"], 2);
        assert_eq!(value["userId"], "u1");
        assert!(value.get("channel").is_none());
    }

    #[test]
    fn search_type_parses() {
        assert_eq!("memory".parse::<SearchType>().unwrap(), SearchType::Memory);
        assert_eq!("sessions".parse::<SearchType>().unwrap(), SearchType::Session);
        assert!("notes".parse::<SearchType>().is_err());
        assert!(SearchType::All.includes(EntryKind::Session));
        assert!(!SearchType::Memory.includes(EntryKind::Session));
    }

    #[test]
    fn now_is_parseable() {
        assert!(parse_timestamp(&now_rfc3339()).is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
