//! CLI `reindex` command: rebuild the search index from storage.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::MnemosConfig;

pub async fn reindex(config: &MnemosConfig) -> Result<()> {
    let orchestrator = super::open_orchestrator(config)?;

    println!("Reindexing with model '{}'...", config.embedding.model);
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let report = orchestrator
        .reindex(|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .await?;
    pb.finish_and_clear();
    orchestrator.close().await?;

    println!(
        "Reindexed {} sessions and {} notes.",
        report.sessions, report.notes
    );
    if report.recomputed > 0 {
        println!("Recomputed {} sessions that had no metadata.", report.recomputed);
    }
    Ok(())
}
