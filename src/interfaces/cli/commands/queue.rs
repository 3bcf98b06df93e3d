//! Report queue commands

use chrono::{Duration, Utc};
use colored::Colorize;

use crate::interfaces::cli::CliError;
use crate::storage::SeaOrmStorage;

pub async fn queue_stats(storage: &SeaOrmStorage) -> Result<(), CliError> {
    let stats = storage.job_stats().await?;
    println!("{}", "Report queue".bold());
    println!("  {:<11} {}", "pending", stats.pending.to_string().yellow());
    println!("  {:<11} {}", "processing", stats.processing.to_string().blue());
    println!("  {:<11} {}", "done", stats.done.to_string().green());
    println!("  {:<11} {}", "failed", stats.failed.to_string().red());
    Ok(())
}

pub async fn requeue_job(storage: &SeaOrmStorage, id: i64) -> Result<(), CliError> {
    if storage.requeue_job(id, Utc::now()).await? {
        println!("{} Job {} is pending again", "✓".bold().green(), id);
        Ok(())
    } else {
        Err(CliError::CommandError(format!(
            "job {} does not exist or has not failed",
            id
        )))
    }
}

pub async fn purge_jobs(storage: &SeaOrmStorage, older_than_days: u32) -> Result<(), CliError> {
    let before = Utc::now() - Duration::days(i64::from(older_than_days));
    let removed = storage.purge_finished_jobs(before).await?;
    println!(
        "{} Removed {} finished jobs older than {} days",
        "✓".bold().green(),
        removed,
        older_than_days
    );
    Ok(())
}
