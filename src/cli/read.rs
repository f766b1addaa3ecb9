//! CLI `read` command: print a session chunk or a note.

use anyhow::Result;

use crate::config::MnemosConfig;

pub async fn read(config: &MnemosConfig, id: &str, chunk: Option<usize>) -> Result<()> {
    let orchestrator = super::open_storage(config)?;
    let result = orchestrator.read(id, chunk).await?;
    orchestrator.close().await?;

    if let Some(title) = &result.title {
        println!("# {title}");
    } else {
        println!(
            "Session {} (chunk {} of {})",
            result.id,
            result.chunk_index + 1,
            result.total_chunks
        );
        if !result.summary.is_empty() {
            println!("Summary: {}", result.summary);
        }
    }
    if result.deleted {
        println!("(deleted)");
    }
    if let Some(tags) = result.tags.as_ref().filter(|t| !t.is_empty()) {
        println!("Tags: {}", tags.join(", "));
    }
    println!();

    if let Some(content) = &result.content {
        println!("{content}");
    }
    for message in result.messages.iter().flatten() {
        match &message.timestamp {
            Some(ts) => println!("[{ts}] {}: {}", message.role, message.content),
            None => println!("{}: {}", message.role, message.content),
        }
    }
    Ok(())
}
