use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::{LogFormat, TollgateConfig};
use tollgate::ratelimit::{PolicySet, SystemClock};
use tollgate::replay;

/// Replay admission requests from stdin against configured rate limit policies.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter directive (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    // Logging settings live in the config file, so it is read before the
    // subscriber exists and its load is reported afterwards.
    let config = TollgateConfig::from_file(&args.config)?;

    init_tracing(&config, &args);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Tollgate");
    info!(
        path = %args.config.display(),
        limiters = config.limiters.len(),
        policies = config.policies.len(),
        "Configuration loaded"
    );

    let policies = PolicySet::from_config(&config, Arc::new(SystemClock::new()))?;

    let input = BufReader::new(tokio::io::stdin());
    let output = tokio::io::stdout();

    tokio::select! {
        stats = replay::run(&policies, input, output) => {
            let stats = stats?;
            info!(
                allowed = stats.allowed,
                denied = stats.denied,
                errors = stats.errors,
                "Input exhausted"
            );
        }
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!(signal, "Shutting down before end of input");
        }
    }

    info!("Tollgate stopped");
    Ok(())
}

/// Logs go to stderr so stdout carries only decisions.
fn init_tracing(config: &TollgateConfig, args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(config, args)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.json_logs || config.logging.format == LogFormat::Json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// The `--log-level` flag wins over the configured level.
fn log_directive(config: &TollgateConfig, args: &Args) -> String {
    args.log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone())
}

/// Resolves with the name of the first termination signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        ctrl_c = signal::ctrl_c() => ctrl_c.map(|()| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> std::io::Result<&'static str> {
    signal::ctrl_c().await.map(|()| "SIGINT")
}
