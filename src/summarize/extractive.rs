//! Offline summarizer that needs no model: it quotes the opening request
//! and the latest reply, and lifts the first line of each user turn as a fact.

use anyhow::Result;
use async_trait::async_trait;

use super::{Summarizer, Summary};
use crate::types::{Message, Role};

pub struct ExtractiveSummarizer {
    pub max_chars: usize,
    pub max_facts: usize,
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self {
            max_chars: 240,
            max_facts: 5,
        }
    }
}

impl ExtractiveSummarizer {
    fn build(&self, messages: &[Message]) -> Summary {
        let first_user = messages.iter().find(|m| m.role == Role::User);
        let last_reply = messages.iter().rev().find(|m| m.role == Role::Assistant);

        let mut parts = Vec::new();
        if let Some(m) = first_user {
            parts.push(truncate(m.content.trim(), self.max_chars));
        }
        if let Some(m) = last_reply {
            parts.push(truncate(m.content.trim(), self.max_chars));
        }
        if parts.is_empty() {
            if let Some(m) = messages.first() {
                parts.push(truncate(m.content.trim(), self.max_chars));
            }
        }

        let mut key_facts: Vec<String> = Vec::new();
        for m in messages.iter().filter(|m| m.role == Role::User) {
            if key_facts.len() >= self.max_facts {
                break;
            }
            let line = m.content.lines().map(str::trim).find(|l| !l.is_empty());
            if let Some(line) = line {
                let fact = truncate(line, 120);
                if !key_facts.contains(&fact) {
                    key_facts.push(fact);
                }
            }
        }

        Summary {
            summary: parts.join(" … "),
            key_facts,
        }
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, messages: &[Message]) -> Result<Summary> {
        Ok(self.build(messages))
    }
}

/// Truncate to at most `max_chars` characters, appending "..." if cut.
fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quotes_first_request_and_last_reply() {
        let messages = vec![
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "How do I rotate the API key?"),
            Message::new(Role::Assistant, "Use the console."),
            Message::new(Role::User, "And from the CLI?"),
            Message::new(Role::Assistant, "Run keys rotate."),
        ];
        let summary = ExtractiveSummarizer::default()
            .summarize(&messages)
            .await
            .unwrap();
        assert_eq!(summary.summary, "How do I rotate the API key? … Run keys rotate.");
        assert_eq!(
            summary.key_facts,
            vec!["How do I rotate the API key?", "And from the CLI?"]
        );
    }

    #[tokio::test]
    async fn empty_session_has_empty_summary() {
        let summary = ExtractiveSummarizer::default().summarize(&[]).await.unwrap();
        assert_eq!(summary, Summary::default());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 5), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn fact_count_is_capped() {
        let messages: Vec<Message> = (0..10)
            .map(|i| Message::new(Role::User, format!("question {i}")))
            .collect();
        let summary = ExtractiveSummarizer::default().build(&messages);
        assert_eq!(summary.key_facts.len(), 5);
    }
}
