use clap::Args;

use super::{open_store, CliResult};

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of records to show
    #[arg(long, default_value = "20")]
    limit: usize,
    #[arg(long)]
    json: bool,
}

pub async fn run(args: HistoryArgs) -> CliResult {
    let store = open_store()?;
    let records = store.list_interventions(args.limit).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("no interventions yet");
    }
    for r in records {
        let local = r.timestamp.with_timezone(&chrono::Local);
        let outcome = if r.was_skipped { "skipped" } else { "completed" };
        println!(
            "{}  {:<24} {:<9} {:>4}s  {:>3.0}%",
            local.format("%Y-%m-%d %H:%M"),
            r.display_name,
            outcome,
            r.duration_seconds,
            r.completion_rate * 100.0
        );
    }
    Ok(())
}
