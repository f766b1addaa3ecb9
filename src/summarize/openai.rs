//! OpenAI-compatible chat-completions summarizer (OpenAI, Ollama, vLLM, LM Studio...).

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{parse_summary_response, transcript, Summarizer, Summary};
use crate::config::SummarizerConfig;
use crate::types::Message;

const SYSTEM_PROMPT: &str = "You summarize conversations for later retrieval by an AI agent. \
Reply in exactly this format:\n\
SUMMARY: <two to four sentences describing what the conversation was about and what was decided>\n\
KEY FACTS:\n\
- <one short, self-contained fact per line>\n\
Only include facts stated in the conversation.";

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiSummarizer {
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            http_client,
        })
    }

    fn build_request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: format!("Conversation:\n{}", transcript(messages)),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.2,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        "openai"
    }

    async fn summarize(&self, messages: &[Message]) -> Result<Summary> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request(messages);

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("summarization request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            anyhow::bail!("summarization API error {status}: {body_text}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse summarization response")?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("no choices in summarization response")?;

        tracing::debug!(model = %self.model, reply_len = choice.message.content.len(), "summary received");
        Ok(parse_summary_response(&choice.message.content))
    }
}
