//! `guestbook`: command-line presentation over `guestbook_core`.
//!
//! # Usage
//!
//! ```text
//! guestbook list
//! guestbook post --author Ann --body "Hi" --secret pw1
//! guestbook delete <remote-id> --secret pw1
//! guestbook -c guestbook.toml --db ./other.db list
//! ```
//!
//! Secrets are read from flags or `GUESTBOOK_SECRET` and never printed.

mod config;

use clap::{Parser, Subcommand};
use config::{CliConfig, ConfigError};
use guestbook_core::db::DbError;
use guestbook_core::{
    Entry, EntryState, LifecycleManager, ReconcileError, ReconcileOutcome, RemoteId,
    RetractError, SqliteRemoteLog, SubmitError, SubmitOutcome,
};
use log::{debug, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Handle;

#[derive(Parser)]
#[command(name = "guestbook", version, about = "Post and retract guestbook entries")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the SQLite database path.
    #[arg(long, global = true, env = "GUESTBOOK_DB")]
    db: Option<PathBuf>,

    /// Override the log directory.
    #[arg(long, global = true, env = "GUESTBOOK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print entries, newest first.
    List,

    /// Post a new entry.
    Post {
        #[arg(long)]
        author: String,

        #[arg(long)]
        body: String,

        /// Secret required later to retract the entry.
        #[arg(long, env = "GUESTBOOK_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// Retract an entry by its store id.
    Delete {
        remote_id: String,

        #[arg(long, env = "GUESTBOOK_SECRET", hide_env_values = true)]
        secret: String,
    },
}

impl Commands {
    fn needs_view(&self) -> bool {
        matches!(self, Self::List | Self::Delete { .. })
    }
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Db(DbError),
    Submit(SubmitError),
    Reconcile(ReconcileError),
    Retract(RetractError),
    UnknownEntry(RemoteId),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "database: {err}"),
            Self::Submit(err) => write!(f, "post rejected: {err}"),
            Self::Reconcile(err) => write!(f, "refresh failed: {err}"),
            Self::Retract(err) => write!(f, "delete rejected: {err}"),
            Self::UnknownEntry(remote_id) => write!(f, "no entry with id {remote_id}"),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Submit(err) => Some(err),
            Self::Reconcile(err) => Some(err),
            Self::Retract(err) => Some(err),
            Self::UnknownEntry(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for CliError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<SubmitError> for CliError {
    fn from(value: SubmitError) -> Self {
        Self::Submit(value)
    }
}

impl From<ReconcileError> for CliError {
    fn from(value: ReconcileError) -> Self {
        Self::Reconcile(value)
    }
}

impl From<RetractError> for CliError {
    fn from(value: RetractError) -> Self {
        Self::Retract(value)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::load(cli.config.as_deref())?
        .with_overrides(cli.db, cli.log_dir)
        .resolve_paths()?;

    // Logging is best-effort; the command still runs without a sink.
    if let Err(err) = guestbook_core::init_logging(&config.log.level, &config.log.dir) {
        eprintln!("warning: logging disabled: {err}");
    }
    info!(
        "event=cli_start module=cli status=ok version={}",
        guestbook_core::core_version()
    );

    let remote = Arc::new(SqliteRemoteLog::open(&config.storage.db_path)?);
    let manager = LifecycleManager::builder(remote)
        .config(config.lifecycle.clone())
        .build(Handle::current());

    if config.lifecycle.refresh_on_start || cli.command.needs_view() {
        refresh(&manager).await?;
    }

    match cli.command {
        Commands::List => print_entries(&manager.snapshot()),
        Commands::Post {
            author,
            body,
            secret,
        } => post(&manager, author, body, secret).await?,
        Commands::Delete { remote_id, secret } => {
            delete(&manager, RemoteId::new(remote_id), &secret).await?
        }
    }
    Ok(())
}

async fn refresh(manager: &LifecycleManager) -> Result<(), CliError> {
    match manager.reconcile().await? {
        ReconcileOutcome::Applied(summary) => {
            debug!(
                "event=cli_refresh module=cli status=ok seq={} confirmed={}",
                summary.seq, summary.confirmed
            );
        }
        ReconcileOutcome::Stale { seq, applied } => {
            debug!("event=cli_refresh module=cli status=stale seq={seq} applied_seq={applied}");
        }
    }
    Ok(())
}

async fn post(
    manager: &LifecycleManager,
    author: String,
    body: String,
    secret: String,
) -> Result<(), CliError> {
    let submission = manager.submit(author, body, secret)?;
    match submission.settled().await {
        SubmitOutcome::Confirmed { remote_id } => println!("posted {remote_id}"),
        SubmitOutcome::AwaitingPropagation { remote_id } => {
            println!("posted {remote_id} (not listed yet)")
        }
        SubmitOutcome::Failed(err) => println!("post failed: {err}"),
    }
    print_entries(&manager.snapshot());
    Ok(())
}

async fn delete(
    manager: &LifecycleManager,
    remote_id: RemoteId,
    secret: &str,
) -> Result<(), CliError> {
    let entry = manager
        .find_by_remote_id(&remote_id)
        .ok_or_else(|| CliError::UnknownEntry(remote_id.clone()))?;
    manager.retract(entry.local_id, secret).await?;
    println!("deleted {remote_id}");
    Ok(())
}

fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("(no entries)");
        return;
    }
    for entry in entries {
        println!("{}", render_line(entry));
    }
}

fn render_line(entry: &Entry) -> String {
    let id = entry
        .remote_id
        .as_ref()
        .map_or_else(|| "-".to_string(), RemoteId::to_string);
    let mut line = format!(
        "[{}] {} {} {}: {}",
        entry.state, id, entry.created_at, entry.author, entry.body
    );
    if entry.state == EntryState::Errored {
        if let Some(reason) = &entry.last_error {
            line.push_str(&format!(" ({reason})"));
        }
    }
    line
}
