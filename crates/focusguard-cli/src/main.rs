use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focusguard", version, about = "FocusGuard CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block list management
    Block {
        #[command(subcommand)]
        action: commands::block::BlockAction,
    },
    /// Focus sessions
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Run a breathing intervention in the terminal
    Intervene(commands::intervene::InterveneArgs),
    /// Recent interventions
    History(commands::history::HistoryArgs),
    /// Today's statistics
    Stats(commands::stats::StatsArgs),
    /// Intervention settings
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Installed blocking rules
    Rules {
        #[command(subcommand)]
        action: commands::rules::RulesAction,
    },
    /// Web app sync
    Sync {
        #[command(subcommand)]
        action: commands::sync::SyncAction,
    },
    /// Sync API key management
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Export, import and reset local data
    Data {
        #[command(subcommand)]
        action: commands::data::DataAction,
    },
    /// Serve extension messages as JSON lines on stdin/stdout
    Daemon,
}

fn init_tracing() {
    let filter = std::env::var("FOCUSGUARD_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| {
            if std::env::var("FOCUSGUARD_DEBUG").is_ok_and(|v| v == "1") {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            }
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Block { action } => commands::block::run(action).await,
        Commands::Focus { action } => commands::focus::run(action).await,
        Commands::Intervene(args) => commands::intervene::run(args).await,
        Commands::History(args) => commands::history::run(args).await,
        Commands::Stats(args) => commands::stats::run(args).await,
        Commands::Settings { action } => commands::settings::run(action).await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Rules { action } => commands::rules::run(action).await,
        Commands::Sync { action } => commands::sync::run(action).await,
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Data { action } => commands::data::run(action).await,
        Commands::Daemon => commands::daemon::run().await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
