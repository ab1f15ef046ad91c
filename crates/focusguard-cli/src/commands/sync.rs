//! Sync subcommand for the companion web app.

use clap::Subcommand;
use focusguard_core::clock::SystemClock;
use focusguard_core::sync::{SyncReport, SyncService};
use focusguard_core::Config;

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum SyncAction {
    /// Upload local interventions now
    Now,
    /// Show whether sync is configured and when it last succeeded
    Status,
}

pub async fn run(action: SyncAction) -> CliResult {
    let config = Config::load_or_default();
    let store = open_store()?;
    let service = SyncService::from_config(store, &config.sync, None, std::sync::Arc::new(SystemClock));

    match action {
        SyncAction::Now => match service.sync_once().await {
            SyncReport::Synced { interventions, .. } => {
                println!("synced {interventions} intervention(s)");
            }
            SyncReport::Skipped { reason } => println!("sync skipped: {reason}"),
            SyncReport::Failed { error } => return Err(format!("sync failed: {error}").into()),
        },
        SyncAction::Status => {
            println!(
                "configured: {}",
                if service.is_configured() { "yes" } else { "no" }
            );
            match service.last_sync().await {
                Some(at) => println!(
                    "last sync: {}",
                    at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
                ),
                None => println!("last sync: never"),
            }
        }
    }
    Ok(())
}
