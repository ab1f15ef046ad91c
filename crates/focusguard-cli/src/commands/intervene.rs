use std::io::Write;

use clap::Args;
use focusguard_core::gate::{GateEvent, GateOutcome, TriggerResult};
use focusguard_core::storage::normalize_identifier;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::{start_guard, stop_guard, CliResult};

const ORIGIN: &str = "terminal";

#[derive(Args)]
pub struct InterveneArgs {
    /// Site or app being opened
    site: String,
    /// Name shown in messages (defaults to the site)
    #[arg(long)]
    name: Option<String>,
}

pub async fn run(args: InterveneArgs) -> CliResult {
    let site = normalize_identifier(&args.site)?;
    let name = args.name.unwrap_or_else(|| site.clone());
    let guard = start_guard().await?;

    let handle = match guard.gate().trigger(ORIGIN, &site, &name).await {
        TriggerResult::Triggered(h) | TriggerResult::AlreadyRunning(h) => h,
    };
    let mut events = handle.events();
    let status = handle.status();
    println!(
        "Take a moment before opening {name}. {}s. Press Enter to skip once allowed, q to quit.",
        status.remaining_secs
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut instruction = status.phase.map(|p| p.instruction()).unwrap_or_default();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(GateEvent::Tick { remaining_secs }) => {
                    print!("\r{instruction:<12} {remaining_secs:>4}s ");
                    std::io::stdout().flush()?;
                }
                Ok(GateEvent::PhaseChanged { phase }) => instruction = phase.instruction(),
                Ok(GateEvent::SkipAvailable) => {
                    println!("\nskip is now available");
                }
                Ok(GateEvent::Resolved { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => {}
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == "q" => {
                    handle.cancel().await;
                }
                Ok(Some(_)) => {
                    if let Err(e) = handle.skip().await {
                        println!("\n{e}");
                    }
                }
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    let outcome = handle.outcome().await;
    println!();
    match outcome {
        GateOutcome::Completed => println!("intervention complete. {name} is open to you."),
        GateOutcome::Skipped => println!("intervention skipped"),
        GateOutcome::Abandoned => println!("intervention abandoned"),
    }
    stop_guard(&guard).await
}
