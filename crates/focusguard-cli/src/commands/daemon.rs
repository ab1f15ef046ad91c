//! Long-running bridge for the browser extension and the usage monitor.
//!
//! Reads one JSON object per line on stdin and answers with one JSON line on
//! stdout. Besides the extension messages it accepts
//! `{"appLaunched": "<id>", "name": "<display name>"}` from the usage monitor.

use std::io::Write;

use focusguard_core::gate::TriggerResult;
use focusguard_core::ExtensionMessage;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{start_guard, stop_guard, CliResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppLaunch {
    app_launched: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Input {
    Message(ExtensionMessage),
    Launch(AppLaunch),
}

pub async fn run() -> CliResult {
    let guard = start_guard().await?;
    tracing::info!("daemon ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Input>(&line) {
            Ok(Input::Message(message)) => serde_json::to_value(guard.handle(message).await)?,
            Ok(Input::Launch(launch)) => {
                let name = launch.name.unwrap_or_else(|| launch.app_launched.clone());
                match guard.on_app_launch_detected(&launch.app_launched, &name).await {
                    Ok(None) => json!({ "result": "notBlocked" }),
                    Ok(Some(TriggerResult::Triggered(h))) => {
                        json!({ "result": "started", "gate": h.status() })
                    }
                    Ok(Some(TriggerResult::AlreadyRunning(h))) => {
                        json!({ "result": "alreadyRunning", "gate": h.status() })
                    }
                    Err(e) => json!({ "result": "error", "message": e.to_string() }),
                }
            }
            Err(e) => {
                tracing::debug!("unreadable message: {e}");
                json!({ "result": "error", "message": format!("invalid message: {e}") })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    tracing::info!("daemon shutting down");
    stop_guard(&guard).await
}
