use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use price_tracker::config::{self, AppConfig};
use price_tracker::error::NotifyError;
use price_tracker::fetcher::http::HttpFetcher;
use price_tracker::model::TargetId;
use price_tracker::notifier::Notifier;
use price_tracker::notifier::terminal::TerminalNotifier;
use price_tracker::notifier::webhook::WebhookNotifier;
use price_tracker::storage::Storage;
use price_tracker::storage::sqlite::SqliteStorage;
use price_tracker::supervisor::Supervisor;
use price_tracker::tracker::TrackerDeps;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("notifier setup error")]
    Notifier,
    #[display("failed to start tracking")]
    Tracking,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "price-tracker", about = "Product price tracker with drop alerts")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Track every configured target until Ctrl+C (the default)
    Run,
    /// Print the stored price history of a target
    History {
        /// Target id as given in the configuration
        #[arg(short, long)]
        target: String,
        /// Number of most recent observations to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/price-tracker.db");
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => monitor(&config, storage).await,
        Command::History { target, limit } => print_history(storage.as_ref(), &target, limit).await,
    }
}

async fn monitor(config: &AppConfig, storage: Arc<dyn Storage>) -> Result<(), Report<AppError>> {
    let targets = config.targets();
    if targets.is_empty() {
        tracing::warn!("no targets configured; nothing to do");
        return Ok(());
    }

    let requests_per_second = NonZeroU32::new(config.general.requests_per_second)
        .ok_or_else(|| Report::new(AppError::Config).attach("requests_per_second is zero"))?;
    let fetcher = HttpFetcher::new(requests_per_second).change_context(AppError::Runtime)?;
    let notifier = build_notifier(config).change_context(AppError::Notifier)?;

    let deps = TrackerDeps {
        fetcher: Arc::new(fetcher),
        storage,
        notifier,
    };
    let supervisor = Arc::new(Supervisor::new(deps, config.tracker_settings()));

    for target in targets {
        let id = target.id.clone();
        supervisor
            .start_tracking(target)
            .change_context(AppError::Tracking)
            .attach_with(|| format!("target: {id}"))?;
    }

    let cancel = CancellationToken::new();
    let status_handle = (config.general.status_log_secs > 0).then(|| {
        tokio::spawn(status_log_loop(
            Arc::clone(&supervisor),
            Duration::from_secs(config.general.status_log_secs),
            cancel.clone(),
        ))
    });

    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();
    if let Some(handle) = status_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    supervisor.shutdown().await;

    info!("shutdown complete");
    Ok(())
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>, Report<NotifyError>> {
    match (config.notifier.kind.as_str(), &config.notifier.webhook_url) {
        ("webhook", Some(url)) => Ok(Arc::new(WebhookNotifier::new(url.as_str())?)),
        _ => Ok(Arc::new(TerminalNotifier)),
    }
}

async fn status_log_loop(supervisor: Arc<Supervisor>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await; // skip immediate first tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for status in supervisor.statuses() {
                    info!(
                        target_id = %status.target_id,
                        owner = %status.owner,
                        state = %status.state,
                        title = status.title.as_deref().unwrap_or("-"),
                        last_price = ?status.last_price,
                        threshold = %status.threshold,
                        last_alert = ?status.last_alert,
                        last_checked = ?status.last_checked,
                        samples = status.recent_history.len(),
                        last_error = status.last_error.as_deref().unwrap_or("-"),
                        "tracker status"
                    );
                }
            }
        }
    }
}

async fn print_history(
    storage: &dyn Storage,
    target: &str,
    limit: usize,
) -> Result<(), Report<AppError>> {
    let observations = storage
        .recent(&TargetId::new(target), limit)
        .await
        .change_context(AppError::Storage)?;

    if observations.is_empty() {
        println!("no observations stored for {target}");
        return Ok(());
    }

    for obs in observations {
        println!("{}  {:>12}  {}", obs.timestamp.to_rfc3339(), obs.price, obs.title);
    }
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
