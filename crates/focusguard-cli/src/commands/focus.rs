use chrono::Utc;
use clap::Subcommand;

use super::{start_guard, stop_guard, CliResult};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Start a focus session; blocked sites redirect until it ends
    Start {
        /// Minutes (defaults to focus.default_minutes)
        minutes: Option<u64>,
    },
    /// End the running session early
    Stop,
    /// Print the current session
    Status {
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(action: FocusAction) -> CliResult {
    let guard = start_guard().await?;
    let result = async {
        match action {
            FocusAction::Start { minutes } => {
                let minutes = minutes.unwrap_or(guard.config().focus.default_minutes);
                let session = guard.focus().start(minutes).await?;
                match session.end_at {
                    Some(end) => println!(
                        "focus session started: {minutes} min, ends {}",
                        end.with_timezone(&chrono::Local).format("%H:%M")
                    ),
                    None => println!("focus session started: {minutes} min"),
                }
            }
            FocusAction::Stop => {
                let was_active = guard.focus().status().await.active;
                guard.focus().stop().await;
                if was_active {
                    println!("focus session stopped");
                } else {
                    println!("no focus session running");
                }
            }
            FocusAction::Status { json } => {
                let session = guard.focus().status().await;
                if json {
                    println!("{}", serde_json::to_string_pretty(&session)?);
                } else if let Some(remaining) = session.remaining(Utc::now()) {
                    let secs = remaining.num_seconds().max(0);
                    println!("focus: {}:{:02} remaining", secs / 60, secs % 60);
                } else {
                    println!("focus: inactive");
                }
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .await;
    stop_guard(&guard).await?;
    result
}
