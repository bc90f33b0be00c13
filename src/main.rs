//! ferrumd entry point.

use std::io::Write as _;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ferrumd::{config::Config, http, metrics, Gateway, Matrix};

#[derive(Parser)]
#[command(name = "ferrumd", about = "A small IRC daemon", version, disable_version_flag = true)]
struct Cli {
    /// Config file path.
    #[arg(long, global = true, default_value = "ircd.yml")]
    conf: String,

    /// Enable debug logging.
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    /// Display version information.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Start the daemon.
    Run,
    /// Hash a password for the config file.
    Genpasswd,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(true)
        .init();
}

fn genpasswd() -> anyhow::Result<()> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);
    let encoded = ferrumd::security::generate_password(password)?;
    println!("{}", encoded);
    Ok(())
}

async fn run(conf: &str) -> anyhow::Result<()> {
    let config = Config::load(conf).map_err(|e| {
        error!(path = %conf, error = %e, "failed to load config");
        anyhow::anyhow!(e)
    })?;

    info!(
        server = %config.server.name,
        network = %config.network.name,
        "starting ferrumd"
    );

    metrics::init();
    tokio::spawn(http::run_metrics_server(http::METRICS_ADDR));

    let matrix = Arc::new(Matrix::new(&config));
    spawn_signal_handler(Arc::clone(&matrix));

    let gateway = Gateway::bind(&config, matrix).await?;
    gateway.run().await;
    Ok(())
}

/// SIGHUP rehashes the config; SIGINT/SIGTERM/SIGQUIT announce the
/// shutdown, give clients a second to see it and exit cleanly.
fn spawn_signal_handler(matrix: Arc<Matrix>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = signal(SignalKind::hangup()).expect("SIGHUP handler");
        let mut interrupt = signal(SignalKind::interrupt()).expect("SIGINT handler");
        let mut terminate = signal(SignalKind::terminate()).expect("SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("SIGQUIT handler");

        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    info!("SIGHUP: rehashing config");
                    if let Err(e) = matrix.rehash() {
                        warn!(error = %e, "rehash failed");
                    }
                }
                _ = interrupt.recv() => break,
                _ = terminate.recv() => break,
                _ = quit.recv() => break,
            }
        }

        matrix.global_notice("shutting down...").await;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        info!("shutdown");
        std::process::exit(0);
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Cmd::Run => run(&cli.conf).await,
        Cmd::Genpasswd => genpasswd(),
    }
}
