use clap::Subcommand;
use focusguard_core::sync::credentials::{self, API_KEY_ENTRY, API_KEY_ENV};

use super::CliResult;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the web app API key in the OS keyring
    SetKey {
        /// API key issued by the web app
        key: String,
    },
    /// Remove the stored API key
    ClearKey,
    /// Check whether an API key is available
    Status,
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::SetKey { key } => {
            let key = key.trim();
            if key.is_empty() {
                return Err("API key must not be empty".into());
            }
            credentials::set(API_KEY_ENTRY, key)?;
            println!("API key saved");
        }
        AuthAction::ClearKey => {
            credentials::delete(API_KEY_ENTRY)?;
            println!("API key removed");
        }
        AuthAction::Status => {
            if std::env::var(API_KEY_ENV).is_ok_and(|k| !k.trim().is_empty()) {
                println!("API key: from {API_KEY_ENV}");
            } else if credentials::get(API_KEY_ENTRY)?.is_some() {
                println!("API key: stored in keyring");
            } else {
                println!("API key: not set");
            }
        }
    }
    Ok(())
}
