use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use common::CallStatus;

mod cmd;
mod tui;

#[derive(Debug, Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Call-screening dashboard client", version)]
struct Cli {
    /// Backend base URL (overrides config file and GATEKEEPER_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// User whose event stream to follow (overrides GATEKEEPER_USER_ID)
    #[arg(long, global = true)]
    user: Option<String>,
    /// Config file (default: <config dir>/gatekeeper/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print aggregate dashboard statistics
    Stats {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List recent calls, newest first
    Calls {
        /// Number of calls to fetch (default: fetch.recent_limit)
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show one call in full
    Call {
        id: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Record the outcome of a call (screening, blocked, passed, completed)
    Outcome {
        id: String,
        #[arg(value_parser = parse_outcome)]
        outcome: CallStatus,
    },
    /// Persist a finished voice session (requires voice credentials)
    LogCall {
        #[arg(long, default_value = "Unknown")]
        caller: String,
        /// Transcript text
        #[arg(long, conflicts_with = "transcript_file")]
        transcript: Option<String>,
        /// Read the transcript from a file
        #[arg(long)]
        transcript_file: Option<PathBuf>,
        /// Scam confidence in [0, 1]
        #[arg(long, default_value_t = 0.0)]
        score: f64,
        #[arg(long, default_value = "unknown")]
        intent: String,
    },
    /// Probe the realtime service
    Health,
    /// Print the effective configuration
    Config,
    /// Follow the event stream and print one line per event
    Watch {
        /// Print events in their wire envelope form
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Interactive live dashboard (default)
    Dashboard,
}

fn parse_outcome(s: &str) -> Result<CallStatus, String> {
    s.parse()
}

fn init_logging(to_file: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact();
    if to_file {
        // The dashboard owns the terminal; logs go to a file instead.
        let path = cmd::util::log_file_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        builder.with_ansi(false).with_writer(std::sync::Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Dashboard);
    init_logging(matches!(command, Commands::Dashboard))?;

    let args = cmd::util::ConfigArgs { api_url: cli.api_url, user: cli.user, config: cli.config };
    let config = cmd::util::load_config(&args)?;

    match command {
        Commands::Stats { json } => cmd::stats(&config, json).await,
        Commands::Calls { limit, json } => cmd::calls(&config, limit, json).await,
        Commands::Call { id, json } => cmd::call(&config, &id, json).await,
        Commands::Outcome { id, outcome } => cmd::outcome(&config, &id, outcome).await,
        Commands::LogCall { caller, transcript, transcript_file, score, intent } => {
            let args = cmd::LogCallArgs { caller, transcript, transcript_file, score, intent };
            cmd::log_call(&config, args).await
        }
        Commands::Health => cmd::health(&config).await,
        Commands::Config => cmd::show_config(&config, args.config.as_deref()),
        Commands::Watch { json } => cmd::watch(&config, json).await,
        Commands::Dashboard => tui::run_dashboard(config).await,
    }
}
