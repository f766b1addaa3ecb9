//! CLI `ingest` command: append a session transcript from a JSON file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::config::MnemosConfig;
use crate::orchestrator::SessionInput;

/// A file holds one session object or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum IngestFile {
    One(SessionInput),
    Many(Vec<SessionInput>),
}

fn parse_file(contents: &str) -> Result<Vec<SessionInput>> {
    let parsed: IngestFile =
        serde_json::from_str(contents).context("expected a session object or an array of them")?;
    Ok(match parsed {
        IngestFile::One(input) => vec![input],
        IngestFile::Many(inputs) => inputs,
    })
}

pub async fn ingest(config: &MnemosConfig, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let inputs = parse_file(&contents)?;

    let orchestrator = super::open_orchestrator(config)?;
    for input in inputs {
        let id = input.id.clone();
        let result = orchestrator
            .ingest_session(input)
            .await
            .with_context(|| format!("failed to ingest session {id}"))?;
        println!(
            "{} {}: {} messages, {} chunk(s)",
            if result.created { "created" } else { "updated" },
            result.id,
            result.message_count,
            result.chunk_count
        );
        if !result.summary.is_empty() {
            println!("  {}", super::preview(&result.summary, 100));
        }
    }
    orchestrator.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_single_object_or_array() {
        let one = r#"{"id":"s1","messages":[{"role":"user","content":"hi"}]}"#;
        assert_eq!(parse_file(one).unwrap().len(), 1);

        let many = r#"[{"id":"s1","messages":[]},{"id":"s2","messages":[],"channel":"slack"}]"#;
        let parsed = parse_file(many).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].channel.as_deref(), Some("slack"));
    }

    #[test]
    fn rejects_unknown_role() {
        let bad = r#"{"id":"s1","messages":[{"role":"robot","content":"beep"}]}"#;
        assert!(parse_file(bad).is_err());
    }
}
