//! Session summarization capability.
//!
//! [`Summarizer`] turns a session's messages into a [`Summary`]. Model-backed
//! implementations ask for a `SUMMARY:` section and a `KEY FACTS:` section and
//! parse the reply with [`parse_summary_response`].

pub mod extractive;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SummarizerConfig;
use crate::types::Message;

const SUMMARY_MARKER: &str = "SUMMARY:";
const KEY_FACTS_MARKER: &str = "KEY FACTS:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub key_facts: Vec<String>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Provider name used to tag errors.
    fn name(&self) -> &str;

    async fn summarize(&self, messages: &[Message]) -> Result<Summary>;
}

/// Create a summarizer from config: `"extractive"` (offline) or `"openai"`
/// (any OpenAI-compatible chat-completions endpoint).
pub fn create_summarizer(config: &SummarizerConfig) -> Result<Box<dyn Summarizer>> {
    match config.provider.as_str() {
        "extractive" => Ok(Box::new(extractive::ExtractiveSummarizer::default())),
        "openai" => Ok(Box::new(openai::OpenAiSummarizer::new(config)?)),
        other => anyhow::bail!("unknown summarizer provider: {other}. Supported: extractive, openai"),
    }
}

/// Split a model reply into summary text and key facts.
///
/// - The summary is the text after `SUMMARY:`, up to `KEY FACTS:` if that follows it.
/// - Without `SUMMARY:`, the whole (trimmed) reply is the summary.
/// - Key facts are the non-empty lines after `KEY FACTS:` with list markers removed;
///   none when the marker is absent.
pub fn parse_summary_response(text: &str) -> Summary {
    let summary_at = text.find(SUMMARY_MARKER);
    let facts_at = text.find(KEY_FACTS_MARKER);

    let summary = match summary_at {
        Some(start) => {
            let body_start = start + SUMMARY_MARKER.len();
            let end = facts_at.filter(|&f| f >= body_start).unwrap_or(text.len());
            text[body_start..end].trim().to_string()
        }
        None => text.trim().to_string(),
    };

    let key_facts = match facts_at {
        Some(start) => {
            let body_start = start + KEY_FACTS_MARKER.len();
            let end = summary_at.filter(|&s| s >= body_start).unwrap_or(text.len());
            text[body_start..end]
                .lines()
                .map(strip_list_marker)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        }
        None => Vec::new(),
    };

    Summary { summary, key_facts }
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    // "1." / "12)" style numbering
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// Render messages as a plain `role: content` transcript for prompting.
pub(crate) fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn parses_both_sections() {
        let reply = "SUMMARY: The user planned a deploy for Friday.\n\nKEY FACTS:\n- Deploy is on Friday\n- Version 2.3\n";
        let parsed = parse_summary_response(reply);
        assert_eq!(parsed.summary, "The user planned a deploy for Friday.");
        assert_eq!(parsed.key_facts, vec!["Deploy is on Friday", "Version 2.3"]);
    }

    #[test]
    fn missing_key_facts_yields_empty_list() {
        let parsed = parse_summary_response("SUMMARY:\nJust a summary.");
        assert_eq!(parsed.summary, "Just a summary.");
        assert!(parsed.key_facts.is_empty());
    }

    #[test]
    fn missing_summary_marker_uses_whole_reply() {
        let reply = "The model ignored the format.";
        let parsed = parse_summary_response(reply);
        assert_eq!(parsed.summary, reply);
        assert!(parsed.key_facts.is_empty());
    }

    #[test]
    fn numbered_and_starred_facts() {
        let reply = "SUMMARY: s\nKEY FACTS:\n1. first\n2) second\n* third\n• fourth\nplain fifth\n\n";
        let parsed = parse_summary_response(reply);
        assert_eq!(
            parsed.key_facts,
            vec!["first", "second", "third", "fourth", "plain fifth"]
        );
    }

    #[test]
    fn key_facts_before_summary() {
        let reply = "KEY FACTS:\n- a\nSUMMARY: late summary";
        let parsed = parse_summary_response(reply);
        assert_eq!(parsed.summary, "late summary");
        assert_eq!(parsed.key_facts, vec!["a"]);
    }

    #[test]
    fn transcript_format() {
        let messages = vec![
            Message::new(Role::User, "hi"),
            Message::new(Role::Assistant, "hello"),
        ];
        assert_eq!(transcript(&messages), "user: hi\nassistant: hello");
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = SummarizerConfig {
            provider: "magic".into(),
            ..Default::default()
        };
        assert!(create_summarizer(&config).is_err());
    }
}
