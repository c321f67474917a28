//! menufinder CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use menufinder::{
    error::{AppError, Result},
    models::Config,
    pipeline::run_pipeline,
    services::{GooglePlacesClient, HostGate, MenuDiscovery, PolicyStore},
    storage::{LocalStorage, TableStorage},
    utils::http,
};

/// menufinder - Restaurant menu discovery pipeline
#[derive(Parser, Debug)]
#[command(
    name = "menufinder",
    version,
    about = "Builds a menu-annotated restaurant dataset for a bounded area"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: search, enrich, crawl, write table
    Crawl {
        /// Output directory (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run menu discovery against a single website
    Probe {
        /// Site root URL
        url: String,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// The directory API credential, required before any network activity.
fn api_key() -> Result<String> {
    std::env::var("GOOGLE_API_KEY")
        .map_err(|_| AppError::config("GOOGLE_API_KEY is not set in the environment"))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(Config::load_or_default(&cli.config));

    match cli.command {
        Command::Crawl { output } => {
            config.validate()?;
            let key = api_key()?;

            // Let in-flight places finish on interrupt, then flush
            let cancel = Arc::new(AtomicBool::new(false));
            let cancel_flag = Arc::clone(&cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received; finishing in-flight places...");
                    cancel_flag.store(true, Ordering::Relaxed);
                }
            });

            let directory = GooglePlacesClient::new(key, config.places.clone())?;
            let outcome = run_pipeline(Arc::clone(&config), &directory, cancel).await?;

            let output_dir = output.unwrap_or_else(|| PathBuf::from(&config.output.dir));
            let storage = LocalStorage::new(output_dir, config.output.table_name.clone());
            let summary = storage.write_table(&outcome.rows, &outcome.stats).await?;

            log::info!("Wrote {} rows to {}", summary.row_count, summary.table_path);
            log::info!("Run stats: {}", summary.stats_path);
        }

        Command::Probe { url } => {
            config.validate()?;

            let client = http::create_async_client(&config.crawler)?;
            let policies = Arc::new(PolicyStore::new(
                client.clone(),
                config.crawler.page_timeout(),
            ));
            let gate = Arc::new(HostGate::new(config.crawler.host_delay()));
            let discovery = MenuDiscovery::new(Arc::clone(&config), client, policies, gate);

            let result = discovery.discover(Some(&url)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            log::info!("Config OK");
        }
    }

    Ok(())
}
