//! Execution log views: `history`, `stats`, `recent`.

use stockpulse_config::StockPulseConfig;
use stockpulse_types::ExecutionRecord;

use crate::run::open_store;

pub async fn show_history(config: &StockPulseConfig, limit: u32, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.recent_history(limit).await?;
    print_records(&records, json)
}

pub async fn show_recent(config: &StockPulseConfig, minutes: u32, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.recent_executions(minutes).await?;
    print_records(&records, json)
}

pub async fn show_stats(config: &StockPulseConfig, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats_by_task().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.is_empty() {
        println!("No executions recorded");
        return Ok(());
    }

    println!(
        "{:<24} {:>6}  {:<10} {:<10} LAST EXECUTION",
        "TASK", "COUNT", "SOURCE", "STATE"
    );
    for row in stats {
        println!(
            "{:<24} {:>6}  {:<10} {:<10} {}",
            row.task_name,
            row.execution_count,
            row.trigger_source,
            row.app_state,
            row.last_execution.to_rfc3339()
        );
    }
    Ok(())
}

fn print_records(records: &[ExecutionRecord], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No executions recorded");
        return Ok(());
    }

    for record in records {
        println!(
            "#{:<6} {}  {:<20} {:<10} {:<10} {}",
            record.id,
            record.execution_time.to_rfc3339(),
            record.task_name,
            record.trigger_source,
            record.app_state,
            record.notes.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
