pub mod delete;
pub mod ingest_session;
pub mod read;
pub mod search;
pub mod update;
pub mod write;

use std::sync::Arc;

use delete::DeleteParams;
use ingest_session::IngestSessionParams;
use read::ReadParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search::SearchParams;
use serde::Serialize;
use update::UpdateParams;
use write::WriteParams;

use crate::error::Error;
use crate::orchestrator::Orchestrator;
use crate::types::SearchType;

/// The mnemos MCP tool handler. Every tool delegates to the shared [`Orchestrator`].
#[derive(Clone)]
pub struct MnemosTools {
    tool_router: ToolRouter<Self>,
    orchestrator: Arc<Orchestrator>,
}

/// Errors cross the MCP boundary as `"<kind>: <message>"`.
fn tool_error(e: Error) -> String {
    format!("{}: {e}", e.kind())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl MnemosTools {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            orchestrator,
        }
    }

    #[tool(description = "Append messages to a conversation session (created on first use) and refresh its summary and search entry. Send only new messages.")]
    async fn ingest_session(
        &self,
        Parameters(params): Parameters<IngestSessionParams>,
    ) -> Result<String, String> {
        let input = params.into_input().map_err(|e| format!("validation: {e}"))?;
        tracing::info!(id = %input.id, messages = input.messages.len(), "ingest_session called");
        let result = self
            .orchestrator
            .ingest_session(input)
            .await
            .map_err(tool_error)?;
        to_json(&result)
    }

    #[tool(description = "Search past sessions and notes with hybrid keyword + semantic ranking. Results carry an id to pass to read.")]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> Result<String, String> {
        let search_type = match params.r#type.as_deref() {
            Some(t) => t.parse::<SearchType>().map_err(|e| format!("validation: {e}"))?,
            None => SearchType::All,
        };
        tracing::info!(query = %params.query, limit = ?params.limit, "search called");
        let results = self
            .orchestrator
            .search(&params.query, params.limit, search_type)
            .await
            .map_err(tool_error)?;
        to_json(&serde_json::json!({
            "results": results,
            "total": results.len(),
        }))
    }

    #[tool(description = "Read one chunk of a session's messages, or a whole note, by id.")]
    async fn read(&self, Parameters(params): Parameters<ReadParams>) -> Result<String, String> {
        tracing::info!(id = %params.id, chunk = ?params.chunk, "read called");
        let result = self
            .orchestrator
            .read(&params.id, params.chunk)
            .await
            .map_err(tool_error)?;
        to_json(&result)
    }

    #[tool(description = "Write a new note (title, markdown content, optional tags). Returns the generated note id.")]
    async fn write(&self, Parameters(params): Parameters<WriteParams>) -> Result<String, String> {
        tracing::info!(title = %params.title, "write called");
        let note = self
            .orchestrator
            .write(params.into())
            .await
            .map_err(tool_error)?;
        to_json(&note)
    }

    #[tool(description = "Update a note's title, content and/or tags. Omitted fields keep their value.")]
    async fn update(&self, Parameters(params): Parameters<UpdateParams>) -> Result<String, String> {
        let (id, patch) = params.into_parts();
        tracing::info!(id = %id, "update called");
        let note = self
            .orchestrator
            .update(&id, patch)
            .await
            .map_err(tool_error)?;
        to_json(&note)
    }

    #[tool(description = "Soft-delete a session or note: it disappears from search but stays readable by id.")]
    async fn delete(&self, Parameters(params): Parameters<DeleteParams>) -> Result<String, String> {
        tracing::info!(id = %params.id, "delete called");
        let result = self
            .orchestrator
            .delete(&params.id)
            .await
            .map_err(tool_error)?;
        to_json(&result)
    }
}

#[tool_handler]
impl ServerHandler for MnemosTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "mnemos remembers conversations and notes. Use ingest_session to save new \
                 messages, search to find relevant sessions and notes, read to page through \
                 a session by chunk, and write/update/delete to manage notes."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_errors_are_prefixed_with_kind() {
        let message = tool_error(Error::NotFound("note mem_1".into()));
        assert!(message.starts_with("not_found: "));
        assert!(message.contains("mem_1"));
    }
}
