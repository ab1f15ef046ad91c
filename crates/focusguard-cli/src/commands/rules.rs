use clap::Subcommand;
use focusguard_core::blocking::FileRuleSink;
use focusguard_core::Config;

use super::{start_guard, stop_guard, CliResult};

#[derive(Subcommand)]
pub enum RulesAction {
    /// Print the installed rules file
    Show,
    /// Regenerate the rules from the block list and focus state
    Sync,
}

pub async fn run(action: RulesAction) -> CliResult {
    match action {
        RulesAction::Show => {
            let sink = FileRuleSink::new(Config::load_or_default().rules_path()?);
            let rules = sink.read()?;
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        RulesAction::Sync => {
            let guard = start_guard().await?;
            let result = guard.resync_rules();
            stop_guard(&guard).await?;
            let rules = result?;
            println!("{} rule(s) installed", rules.len());
        }
    }
    Ok(())
}
