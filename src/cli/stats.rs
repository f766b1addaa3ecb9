use anyhow::Result;

use crate::config::{MnemosConfig, ModelDimensions};
use crate::db;

/// Print storage counts and index health.
pub async fn stats(config: &MnemosConfig) -> Result<()> {
    let orchestrator = super::open_storage(config)?;
    let counts = orchestrator.stats().await?;
    orchestrator.close().await?;

    let dimensions = config.embedding.resolve_dimensions(&ModelDimensions::default())?;
    let index_path = config.index_path();
    let conn = db::open_database(&index_path, dimensions)?;
    let health = db::check_database_health(&conn)?;

    println!("mnemos statistics");
    println!("{}", "=".repeat(40));
    println!("  Root:                {}", config.resolved_root().display());
    println!("  Sessions:            {}", counts.sessions);
    println!("    deleted:           {}", counts.deleted_sessions);
    println!("    awaiting ingest:   {}", counts.pending_sessions);
    println!("  Messages:            {}", counts.messages);
    println!("  Notes:               {}", counts.notes);
    println!("    deleted:           {}", counts.deleted_notes);
    println!();

    println!("Index ({})", index_path.display());
    println!("  Schema version:      {}", health.schema_version);
    println!("  sqlite-vec:          {}", health.sqlite_vec_version);
    println!(
        "  Embedding model:     {}",
        health.embedding_model.as_deref().unwrap_or("(none)")
    );
    if let Some(dim) = health.embedding_dimensions {
        println!("  Dimensions:          {dim}");
    }
    println!(
        "  Indexed sessions:    {} ({} deleted)",
        health.session_count, health.deleted_session_count
    );
    println!(
        "  Indexed notes:       {} ({} deleted)",
        health.memory_count, health.deleted_memory_count
    );
    println!(
        "  Integrity:           {}",
        if health.integrity_ok { "ok" } else { health.integrity_details.as_str() }
    );

    if health.session_count as usize != counts.sessions
        || health.memory_count as usize != counts.notes
    {
        println!();
        println!("Index and storage disagree; run `mnemos reindex`.");
    }
    Ok(())
}
