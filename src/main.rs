//! ScrapeWatch: Monitoring and Control Dashboard for a Scraping Service
//!
//! Serves a REST API over the reconciled view of a scraping service, its
//! Redis work queue, and locally orchestrated jobs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scrapewatch::config::{Config, LogFormat};
use scrapewatch::http::HttpServer;
use scrapewatch::service::Dashboard;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "scrapewatch")]
#[command(about = "Monitoring and control dashboard for a scraping service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "scrapewatch.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server
    Serve {
        /// Listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load or create config
    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    setup_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Init { path } => init_config(path),
    }
}

fn setup_logging(config: &Config, verbose: u8) -> Result<()> {
    // CLI verbosity overrides the configured level.
    let level = match verbose {
        0 => match config.logging.level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        },
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    match config.logging.format {
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .json()
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(addr) = listen {
        config.http.listen_addr = addr;
    }
    config.validate()?;

    info!("Starting scrapewatch dashboard...");
    info!("Remote service: {}", config.remote.api_url);
    info!("Queue store: {}", config.queue.url);

    let dashboard = Arc::new(Dashboard::new(config.clone())?);
    let server = HttpServer::new(config.http.clone(), dashboard.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    });

    server.run(shutdown_rx).await?;

    // Stop any in-flight job tasks before exiting.
    dashboard.shutdown().await;

    Ok(())
}

fn init_config(path: PathBuf) -> Result<()> {
    let config_path = path.join("scrapewatch.toml");
    std::fs::write(&config_path, Config::default_toml()?)?;
    println!("Created configuration file: {}", config_path.display());
    Ok(())
}
