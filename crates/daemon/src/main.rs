//! docsync daemon: receives GitHub webhooks and keeps documentation folders
//! current until SIGINT/SIGTERM.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docsync_core::config::AppConfig;
use docsync_core::db::Database;
use docsync_core::docgen::HttpDocGenerator;
use docsync_core::file_policy::FilePolicy;
use docsync_core::github::GitHubClient;
use docsync_core::lifecycle::WebhookLifecycle;
use docsync_core::sync::{FileSyncWorker, PushProcessor, WebhookIngestor};
use docsync_web::AppState;

/// How long in-flight deliveries may run once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(
    name = "docsync-daemon",
    version,
    about = "Keeps generated documentation in sync with GitHub pushes"
)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter overriding `server.log_level`, e.g. `debug` or
    /// `docsync_core=trace,info`.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Wire store, GitHub client and generator into the application state.
fn build_state(config: AppConfig) -> Result<AppState> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!("failed to create {}", config.server.data_dir.display())
    })?;
    let db_path = config.server.database_path();
    let db = Database::new(&db_path).context("failed to open database")?;
    db.initialize().context("failed to migrate database")?;
    let db = Arc::new(db);
    info!(path = %db_path.display(), "store ready");

    let github =
        GitHubClient::from_config(&config.github).context("failed to build GitHub client")?;
    let generator = HttpDocGenerator::new(&config.docgen)
        .context("failed to build documentation generator")?;

    let worker = Arc::new(FileSyncWorker::new(
        db.clone(),
        Arc::new(github.clone()),
        Arc::new(generator),
        FilePolicy::from(&config.sync),
        config.docgen.timeout(),
    ));
    let processor = Arc::new(PushProcessor::new(
        db.clone(),
        worker,
        config.sync.doc_extension.clone(),
        config.sync.max_concurrent_files,
    ));
    let ingestor = Arc::new(WebhookIngestor::new(db.clone(), processor));
    let lifecycle = WebhookLifecycle::new(db.clone(), github, config.server.public_url.clone());

    Ok(AppState::new(config, db, ingestor, lifecycle))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_and_resolve(&args.config)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;

    let filter = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.server.log_level.clone());
    init_logging(&filter);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        listen = %config.server.listen,
        public_url = %config.server.public_url,
        github_api = %config.github.api_url,
        docgen = %config.docgen.endpoint,
        "starting docsync daemon"
    );
    if config.github.token.is_none() {
        warn!("no GitHub service token configured; only public repositories can be fetched");
    }

    let listen = config.server.listen.clone();
    let state = build_state(config)?;

    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let mut server = tokio::spawn(async move {
        docsync_web::serve(state, &listen, async move { stop.cancelled().await }).await
    });

    tokio::select! {
        _ = signals::cancel_on_signal(shutdown.clone()) => {
            info!(grace_secs = SHUTDOWN_GRACE.as_secs(), "draining in-flight deliveries");
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => joined.context("web server task panicked")??,
                Err(_) => {
                    warn!("grace period elapsed, aborting remaining requests");
                    server.abort();
                }
            }
        }
        joined = &mut server => {
            shutdown.cancel();
            joined.context("web server task panicked")?.context("web server failed")?;
        }
    }

    info!("docsync daemon stopped");
    Ok(())
}
