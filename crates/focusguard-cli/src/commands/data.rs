use std::path::PathBuf;

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use focusguard_core::storage::{ClearScope, DataSnapshot};

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum DataAction {
    /// Write all local data as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Load data exported by `data export`
    Import { path: PathBuf },
    /// Delete local data
    Reset {
        #[arg(long, value_enum, default_value = "all")]
        scope: Scope,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Scope {
    Interventions,
    Settings,
    Blocked,
    All,
}

impl From<Scope> for ClearScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Interventions => ClearScope::Interventions,
            Scope::Settings => ClearScope::Settings,
            Scope::Blocked => ClearScope::Blocked,
            Scope::All => ClearScope::All,
        }
    }
}

pub async fn run(action: DataAction) -> CliResult {
    let store = open_store()?;
    match action {
        DataAction::Export { output } => {
            let snapshot = store.export_snapshot(Utc::now()).await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        DataAction::Import { path } => {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: DataSnapshot = serde_json::from_str(&content)?;
            let imported = store.import_snapshot(&snapshot).await?;
            println!("imported {imported} intervention(s)");
        }
        DataAction::Reset { scope } => {
            store.clear(scope.into()).await?;
            println!("data cleared");
        }
    }
    Ok(())
}
