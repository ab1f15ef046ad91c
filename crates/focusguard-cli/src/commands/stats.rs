use chrono::Utc;
use clap::Args;

use super::{open_store, CliResult};

#[derive(Args)]
pub struct StatsArgs {
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatsArgs) -> CliResult {
    let store = open_store()?;
    let summary = store.daily_summary(Utc::now()).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("interventions today: {}", summary.interventions);
        println!("  completed: {}", summary.completed);
        println!("  skipped:   {}", summary.skipped);
        println!("time saved: {}", summary.time_saved_label());
    }
    Ok(())
}
