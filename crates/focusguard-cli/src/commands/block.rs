use clap::Subcommand;
use focusguard_core::blocking::DEFAULT_BLOCKED_SITES;
use focusguard_core::storage::normalize_identifier;

use super::{start_guard, stop_guard, CliResult};

#[derive(Subcommand)]
pub enum BlockAction {
    /// List blocked sites and apps
    List {
        #[arg(long)]
        json: bool,
    },
    /// Block a site or app
    Add {
        /// Domain (e.g. "reddit.com") or app identifier
        site: String,
    },
    /// Unblock a site or app
    Remove { site: String },
    /// Block if unblocked, unblock if blocked
    Toggle { site: String },
    /// Restore the default block list
    Reset,
    /// Show which blocked entry a URL falls under
    Check { url: String },
}

pub async fn run(action: BlockAction) -> CliResult {
    let guard = start_guard().await?;
    let result = async {
        match action {
            BlockAction::List { json } => {
                let blocked = guard.store().blocked_list().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&blocked)?);
                } else {
                    for site in blocked {
                        println!("{site}");
                    }
                }
            }
            BlockAction::Add { site } => {
                let id = normalize_identifier(&site)?;
                if guard.store().blocked_list().await?.contains(&id) {
                    println!("{id} is already blocked");
                } else {
                    guard.toggle_blocked(&id).await?;
                    println!("blocked {id}");
                }
            }
            BlockAction::Remove { site } => {
                let id = normalize_identifier(&site)?;
                if guard.store().blocked_list().await?.contains(&id) {
                    guard.toggle_blocked(&id).await?;
                    println!("unblocked {id}");
                } else {
                    println!("{id} is not blocked");
                }
            }
            BlockAction::Toggle { site } => {
                let id = normalize_identifier(&site)?;
                if guard.toggle_blocked(&id).await? {
                    println!("blocked {id}");
                } else {
                    println!("unblocked {id}");
                }
            }
            BlockAction::Reset => {
                let defaults: Vec<String> =
                    DEFAULT_BLOCKED_SITES.iter().map(|s| s.to_string()).collect();
                guard.replace_blocked(&defaults).await?;
                println!("block list reset to {} default entries", defaults.len());
            }
            BlockAction::Check { url } => match guard.blocked_entry_for(&url).await? {
                Some(site) => println!("blocked ({site})"),
                None => println!("not blocked"),
            },
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .await;
    stop_guard(&guard).await?;
    result
}
