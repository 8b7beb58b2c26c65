use anyhow::Result;
use clap::Parser;
use kiln::analytics::{AnalyticsSink, NoopSink, PostHogSink};
use kiln::config::KilnConfig;
use kiln::queue::MemoryJobQueue;
use kiln::status_check::StatusChecker;
use kiln::store::SqliteStore;
use kiln::trainer::HttpTrainerClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reconciles in-flight fine-tunes against the trainer", long_about = None)]
struct Args {
    /// Provider whose fine-tunes to reconcile (overrides KILN_PROVIDER)
    #[arg(long)]
    provider: Option<String>,

    /// Seconds between poll cycles (overrides KILN_POLL_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Path to the SQLite database (overrides KILN_DB_PATH)
    #[arg(long)]
    db_path: Option<String>,

    /// Base URL of the trainer service (overrides KILN_TRAINER_URL)
    #[arg(long)]
    trainer_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = KilnConfig::from_env();
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(secs) = args.interval_secs {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if let Some(trainer_url) = args.trainer_url {
        config.trainer_url = trainer_url;
    }

    info!(
        provider = %config.provider,
        db_path = %config.db_path,
        trainer_url = %config.trainer_url,
        interval_secs = config.poll_interval.as_secs(),
        "starting kiln-worker"
    );

    let store = Arc::new(SqliteStore::new(&config.db_path).await?);
    let trainer = Arc::new(HttpTrainerClient::new(
        config.trainer_url.clone(),
        config.trainer_api_key.clone(),
    )?);
    let queue = Arc::new(MemoryJobQueue::new());
    let sink: Arc<dyn AnalyticsSink> = match &config.posthog_api_key {
        Some(api_key) => Arc::new(PostHogSink::new(api_key.clone())),
        None => Arc::new(NoopSink),
    };

    let checker = StatusChecker::new(store, trainer, queue, sink, config.provider.clone())
        .with_policy(config.check_policy());

    checker.run(config.poll_interval).await;
    Ok(())
}
