pub mod auth;
pub mod block;
pub mod config;
pub mod daemon;
pub mod data;
pub mod focus;
pub mod history;
pub mod intervene;
pub mod rules;
pub mod settings;
pub mod stats;
pub mod sync;

use focusguard_core::{Config, FocusGuard, RecordStore};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the service context and bring it up.
pub async fn start_guard() -> Result<FocusGuard, Box<dyn std::error::Error>> {
    let guard = FocusGuard::open(Config::load_or_default())?;
    guard.initialize().await?;
    Ok(guard)
}

/// Write the rules for the current state and stop background tasks.
pub async fn stop_guard(guard: &FocusGuard) -> CliResult {
    let result = guard.resync_rules();
    guard.shutdown().await;
    result?;
    Ok(())
}

/// The durable store. One-shot commands refuse to run on a throwaway
/// in-memory store.
pub fn open_store() -> Result<RecordStore, Box<dyn std::error::Error>> {
    Ok(RecordStore::open_default()?)
}
