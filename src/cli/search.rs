//! CLI `search` command: run a hybrid query from the terminal.

use anyhow::Result;

use crate::config::MnemosConfig;
use crate::types::SearchType;

pub async fn search(
    config: &MnemosConfig,
    query: &str,
    limit: Option<usize>,
    search_type: SearchType,
) -> Result<()> {
    let orchestrator = super::open_orchestrator(config)?;
    let results = orchestrator.search(query, limit, search_type).await?;
    orchestrator.close().await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let label = result.title.as_deref().unwrap_or(&result.id);
        println!(
            "{:>2}. [{:.3}] {:<7} {}  ({})",
            rank + 1,
            result.score,
            result.kind,
            label,
            result.timestamp
        );
        println!("      id: {}  chunks: {}", result.id, result.chunks);
        println!("      {}", super::preview(&result.text, 100));
    }
    Ok(())
}
