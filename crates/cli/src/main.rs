//! docsync command-line management tool.
//!
//! Generates and validates configuration files, registers tracked
//! repositories, and inspects repository status, webhook events and
//! per-file sync outcomes straight from the daemon's database.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, Color};
use tracing_subscriber::EnvFilter;

use docsync_core::config::AppConfig;
use docsync_core::db::queries::NewTrackedRepository;
use docsync_core::db::Database;
use docsync_core::github::payload::short_sha;
use docsync_core::lifecycle::generate_secret;
use docsync_core::models::{Pagination, RepoSlug, RepositoryStatus};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// docsync command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "docsync",
    version,
    about = "Manage and inspect a docsync documentation sync service"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "/etc/docsync/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./docsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Register a GitHub repository for a documentation folder.
    Track {
        /// GitHub repository URL, e.g. https://github.com/acme/widgets.
        url: String,

        /// User id owning the documentation folder.
        #[arg(long)]
        owner: String,

        /// Directory the generated documentation is written to.
        #[arg(long)]
        folder: PathBuf,

        /// Branch whose pushes are synced.
        #[arg(long, default_value = "main")]
        branch: String,
    },

    /// Forget a documentation folder together with its tracked repository,
    /// events and file records. Generated files on disk are left alone.
    Untrack {
        /// Documentation folder id.
        doc_id: i64,
    },

    /// List tracked repositories.
    Repos,

    /// Show sync status of one tracked repository.
    Status {
        /// Tracked repository id.
        repo_id: i64,
    },

    /// Turn automatic sync on or off for a repository.
    AutoSync {
        /// Tracked repository id.
        repo_id: i64,

        #[arg(value_enum)]
        state: Toggle,
    },

    /// Show recent webhook events of a repository, newest first.
    Events {
        /// Tracked repository id.
        repo_id: i64,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        per_page: u32,
    },

    /// Show per-file outcomes of one webhook event.
    Files {
        /// Webhook event id.
        event_id: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        command => {
            let config = load_config(&cli.config)?;
            let db = open_database(&config)?;

            match command {
                Commands::Track {
                    url,
                    owner,
                    folder,
                    branch,
                } => cmd_track(&db, &config, &url, &owner, &folder, &branch),
                Commands::Untrack { doc_id } => cmd_untrack(&db, doc_id),
                Commands::Repos => cmd_repos(&db),
                Commands::Status { repo_id } => cmd_status(&db, &config, repo_id),
                Commands::AutoSync { repo_id, state } => cmd_auto_sync(&db, repo_id, state),
                Commands::Events {
                    repo_id,
                    page,
                    per_page,
                } => cmd_events(&db, repo_id, page, per_page),
                Commands::Files { event_id } => cmd_files(&db, event_id),
                Commands::Init { .. } | Commands::Validate => Ok(()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_from_file(path)?;
    config.resolve_env_vars()?;
    Ok(config)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config.server.database_path();
    let db = Database::new(&path).with_context(|| format!("cannot open {}", path.display()))?;
    db.initialize()?;
    Ok(db)
}

fn format_time(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists, refusing to overwrite it", output.display());
    }

    std::fs::write(output, AppConfig::example_toml()).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set server.public_url to the address GitHub can reach");
    println!("  2. Point docgen.endpoint at your documentation generator");
    println!("  3. Validate with: docsync validate --config {}", output.display());
    println!("  4. Start the daemon: docsync-daemon --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("{}", style::header(&format!("Checking {}", config_path.display())));

    let mut config = AppConfig::load_from_file(config_path).context("cannot parse configuration")?;
    config
        .resolve_env_vars()
        .context("cannot resolve secret references")?;
    if let Err(e) = config.validate() {
        println!("{}", style::error(&e.to_string()));
        anyhow::bail!("{} is not usable", config_path.display());
    }

    let set_or = |present: bool, missing: &'static str| if present { "set" } else { missing };

    println!("  Listen         : {}", config.server.listen);
    println!("  Public URL     : {}", config.server.public_url);
    println!("  Data directory : {}", config.server.data_dir.display());
    println!("  GitHub API     : {}", config.github.api_url);
    println!(
        "  GitHub token   : {}",
        set_or(config.github.token.is_some(), "not set (public repositories only)")
    );
    println!("  Doc generator  : {}", config.docgen.endpoint);
    println!(
        "  Generator key  : {}",
        set_or(config.docgen.api_key.is_some(), "not set")
    );
    println!("  Extensions     : {}", config.sync.code_extensions.join(" "));
    println!("  Doc extension  : .{}", config.sync.doc_extension);
    println!("  Concurrency    : {}", config.sync.max_concurrent_files);
    println!();
    println!("{}", style::success("configuration is valid"));

    Ok(())
}

fn cmd_track(
    db: &Database,
    config: &AppConfig,
    url: &str,
    owner: &str,
    folder: &Path,
    branch: &str,
) -> Result<()> {
    let slug = RepoSlug::parse_github_url(url)
        .with_context(|| format!("not a GitHub repository URL: {}", url))?;
    let folder = folder
        .to_str()
        .context("documentation folder path must be valid UTF-8")?;

    let secret = generate_secret();
    let (doc_folder, repo) = db
        .create_tracked_folder(
            owner,
            folder,
            &NewTrackedRepository {
                doc_folder_id: 0,
                github_url: url.trim(),
                owner: &slug.owner,
                repo_name: &slug.name,
                branch,
                webhook_secret: &secret,
            },
        )
        .context("failed to register repository")?;

    println!("{}", style::success(&format!("Tracking {} (repository id {})", repo, repo.id)));
    println!();
    println!("  Documentation folder : {} (doc id {})", doc_folder.folder_path, doc_folder.id);
    println!("  Branch               : {}", repo.branch);
    println!("  Callback URL         : {}", config.callback_url(repo.id));
    println!();
    println!(
        "{}",
        style::dim("Create the GitHub webhook through POST /api/webhooks/setup with the owner's token.")
    );
    Ok(())
}

fn cmd_repos(db: &Database) -> Result<()> {
    let repos = db
        .list_tracked_repositories()
        .context("failed to list tracked repositories")?;

    if repos.is_empty() {
        println!("No tracked repositories.");
        return Ok(());
    }

    let mut table = style::table(vec![
        "ID", "Repository", "Branch", "Doc ID", "Webhook", "Auto-sync", "Last commit", "Failures",
    ]);

    for repo in &repos {
        let webhook = match (repo.webhook_id, repo.is_webhook_active) {
            (Some(id), true) => Cell::new(format!("#{} active", id)).fg(Color::Green),
            (Some(id), false) => Cell::new(format!("#{} inactive", id)).fg(Color::Yellow),
            (None, _) => Cell::new("-"),
        };
        table.add_row(vec![
            Cell::new(repo.id),
            Cell::new(repo.full_name()),
            Cell::new(&repo.branch),
            Cell::new(repo.doc_folder_id),
            webhook,
            Cell::new(if repo.auto_sync_enabled { "on" } else { "off" }),
            Cell::new(repo.last_commit_sha.as_deref().map(short_sha).unwrap_or("-")),
            Cell::new(repo.sync_failures),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn cmd_status(db: &Database, config: &AppConfig, repo_id: i64) -> Result<()> {
    let repo = db
        .require_tracked_repository(repo_id)
        .context("failed to load repository")?;
    let status = RepositoryStatus::from(&repo);

    println!("{}", style::header(&format!("{} ({})", repo, repo.branch)));
    println!();
    println!("  Repository URL  : {}", status.repo_url);
    println!(
        "  Webhook         : {}",
        if status.webhook_active { "active" } else { "not active" }
    );
    println!("  Callback URL    : {}", config.callback_url(repo.id));
    println!(
        "  Auto-sync       : {}",
        if status.auto_sync_enabled { "enabled" } else { "disabled" }
    );
    println!("  Last sync at    : {}", format_time(status.last_sync_at));
    println!(
        "  Last commit     : {}",
        repo.last_commit_sha.as_deref().unwrap_or("none")
    );
    println!("  Sync failures   : {}", status.sync_failures);
    if let Some(err) = &status.last_error {
        println!();
        println!("{}", style::warn(&format!("Last error: {}", err)));
    }
    Ok(())
}

fn cmd_untrack(db: &Database, doc_id: i64) -> Result<()> {
    let repo = db
        .get_repository_for_folder(doc_id)
        .context("failed to load repository")?;
    db.delete_doc_folder(doc_id)
        .with_context(|| format!("cannot remove documentation folder {doc_id}"))?;

    match repo {
        Some(repo) => {
            println!("{}", style::success(&format!("Stopped tracking {repo}")));
            if repo.is_webhook_active {
                println!(
                    "{}",
                    style::warn("The GitHub webhook still exists; delete it from the repository settings.")
                );
            }
        }
        None => println!("{}", style::success(&format!("Removed documentation folder {doc_id}"))),
    }
    Ok(())
}

fn cmd_auto_sync(db: &Database, repo_id: i64, state: Toggle) -> Result<()> {
    let repo = db
        .require_tracked_repository(repo_id)
        .context("failed to load repository")?;
    let enabled = matches!(state, Toggle::On);
    db.set_auto_sync(repo.id, enabled)
        .context("failed to update auto-sync")?;

    let word = if enabled { "enabled" } else { "disabled" };
    println!("{}", style::success(&format!("Auto-sync {} for {}", word, repo)));
    Ok(())
}

fn cmd_events(db: &Database, repo_id: i64, page: u32, per_page: u32) -> Result<()> {
    let repo = db
        .require_tracked_repository(repo_id)
        .context("failed to load repository")?;
    let result = db
        .list_events_for_repository(
            repo.id,
            &Pagination {
                page: page.max(1),
                per_page: per_page.clamp(1, 100),
            },
        )
        .context("failed to list webhook events")?;

    if result.items.is_empty() {
        println!("No webhook events for {}.", repo);
        return Ok(());
    }

    println!();
    println!(
        "{}",
        style::header(&format!(
            "Webhook events for {} (page {}/{}, {} total)",
            repo,
            result.page,
            result.total_pages.max(1),
            result.total
        ))
    );
    println!();

    let mut table = style::table(vec![
        "ID", "Type", "Delivery", "Commit", "Status", "Files", "Received", "Error",
    ]);

    for event in &result.items {
        table.add_row(vec![
            Cell::new(event.id),
            Cell::new(event.event_type),
            Cell::new(&event.delivery_id),
            Cell::new(event.commit_sha.as_deref().map(short_sha).unwrap_or("-")),
            style::status_cell(event.status),
            Cell::new(event.files_processed),
            Cell::new(format_time(Some(event.created_at))),
            Cell::new(event.error_message.as_deref().unwrap_or("")),
        ]);
    }

    println!("{}", table);
    println!();
    Ok(())
}

fn cmd_files(db: &Database, event_id: i64) -> Result<()> {
    let event = db
        .get_webhook_event(event_id)
        .context("failed to load webhook event")?
        .with_context(|| format!("webhook event {} not found", event_id))?;
    let files = db
        .list_file_syncs(event.id)
        .context("failed to list file sync records")?;

    println!(
        "{}",
        style::header(&format!(
            "Event {} ({}, {})",
            event.id, event.event_type, event.status
        ))
    );
    if files.is_empty() {
        println!("No files were synced for this event.");
        return Ok(());
    }

    let mut table = style::table(vec!["File", "Action", "Outcome", "Error"]);

    for record in &files {
        table.add_row(vec![
            Cell::new(&record.file_path),
            Cell::new(record.action),
            style::outcome_cell(record.success),
            Cell::new(record.error_message.as_deref().unwrap_or("")),
        ]);
    }

    println!("{}", table);
    Ok(())
}
