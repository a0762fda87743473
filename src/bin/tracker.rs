use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use polymarket_tracker::api::DataApiClient;
use polymarket_tracker::config::{AppConfig, SETTINGS_PATH, Settings};
use polymarket_tracker::notifier::{StdoutNotifier, TelegramNotifier};
use polymarket_tracker::reporter;
use polymarket_tracker::state::StateStore;
use polymarket_tracker::tracker::run_once;

#[derive(Parser)]
#[command(
    name = "tracker",
    about = "Polymarket trade tracker: alerts on new trades by watched wallets"
)]
struct Args {
    /// Settings file (TOML). Missing file means defaults.
    #[arg(long, default_value = SETTINGS_PATH)]
    config: PathBuf,

    /// State file path, overrides the settings file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Print alerts to stdout instead of sending them; state is not saved
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut settings = Settings::load(&args.config)?;
    if let Some(path) = args.state_file {
        settings.state_file = path;
    }
    let config = AppConfig::from_env(|key| std::env::var(key).ok(), settings)
        .context("invalid configuration, nothing was fetched")?;

    info!("=== Polymarket Tracker ===");
    for wallet in &config.wallets {
        info!(
            "Watching {} ({}), bankroll ${}",
            wallet.display_name, wallet.address, wallet.reference_bankroll
        );
    }
    info!("Your bankroll: ${}", config.your_bankroll);

    let store = StateStore::new(&config.settings.state_file);
    let mut state = store.load();
    info!("{} trade(s) already notified", state.len());

    let source = DataApiClient::new(&config.settings);
    let summary = if args.dry_run {
        info!("Dry run: alerts are printed, not sent");
        run_once(&config, &source, &StdoutNotifier, &mut state).await
    } else {
        let notifier = TelegramNotifier::new(&config);
        run_once(&config, &source, &notifier, &mut state).await
    };

    if args.dry_run {
        info!("Dry run: state file left untouched");
    } else if let Err(e) = store.persist(&state) {
        warn!("Failed to persist state to {}: {e}", store.path().display());
    }

    info!(
        "Check complete: {} new, {} notified, {} failed",
        summary.new_trades, summary.notified, summary.failed_deliveries
    );
    reporter::report_summary(&summary);

    Ok(())
}
