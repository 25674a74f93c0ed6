mod client;
mod config;
mod nakama;
mod run;
mod signals;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Minimal demo client for a Nakama realtime server: authenticate a
/// device-bound user, hold the session open for a while, shut down cleanly
/// on SIGINT/SIGTERM. A single Ctrl-C closes the session gracefully; a
/// double Ctrl-C (or SIGTERM) stops the run immediately.
#[derive(Parser, Debug)]
#[command(name = "nakama-idle", version, about)]
struct Cli {
    /// Server base URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Server key used for client-level auth (overrides config)
    #[arg(long)]
    key: Option<String>,

    /// Idle duration before voluntary exit, e.g. 10m or 90s (overrides config)
    #[arg(short, long)]
    duration: Option<String>,

    /// Device/user identifier (overrides config)
    #[arg(long)]
    id: Option<String>,

    /// Display name sent on authentication (overrides config)
    #[arg(long)]
    username: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nakama_idle=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let overrides = config::Overrides {
        url: cli.url,
        key: cli.key,
        duration: cli.duration,
        id: cli.id,
        username: cli.username,
    };
    let config = match config::resolve(&cli.config, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        }
    };
    tracing::debug!(?config, "resolved run configuration");

    let connector = nakama::NakamaConnector::new();
    if let Err(e) = run::run(&connector, &config).await {
        eprintln!("error: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}
