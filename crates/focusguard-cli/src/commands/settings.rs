use clap::Subcommand;

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print all settings as JSON
    Show,
    /// Get a setting (e.g. "interventionDurationSeconds", "allowSkip")
    Get { key: String },
    /// Set a setting
    Set { key: String, value: String },
}

pub async fn run(action: SettingsAction) -> CliResult {
    let store = open_store()?;
    let mut settings = store.load_settings().await?;
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        SettingsAction::Get { key } => match settings.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown setting: {key}").into()),
        },
        SettingsAction::Set { key, value } => {
            settings.set(&key, &value)?;
            store.save_settings(&settings).await?;
            println!("ok");
        }
    }
    Ok(())
}
