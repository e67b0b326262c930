use clap::{Parser, Subcommand, ValueEnum};
use quill_config::Config;
use quill_index::Repository;
use quill_remote::Database;
use quill_storage::Scanner;
use quill_sync::flow::{self, DiffReport, GiveReport};
use quill_sync::transfer::TransferStats;
use quill_sync::{Confirm, Context, GetMode, GiveMode, IndexedState, LocalState, Never, Outcome, ScanState};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcDateTime};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quill", version, about = "Back a directory tree up into a versioned database")]
struct Cli {
    /// Never ask; commit whatever the run produces
    #[arg(short, long, global = true)]
    force: bool,

    /// Never prompt (declining unless --force) and only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    silent: bool,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config file (default: quill.toml in the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report differences between the local tree and the store
    Diff,
    /// Make the local tree match the store
    Get { scope: Option<Scope> },
    /// Make the store match the local tree
    Give { scope: Option<Scope> },
    /// Create the remote schema and build the local index
    Init,
    /// Show the local index commit log
    Log {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Write the tree as it was at an instant into an empty directory
    ///
    /// Example: quill snapshot 2024-05-01T12:00:00Z ./restored
    Snapshot {
        /// RFC 3339 timestamp
        at: String,
        dest: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Scope {
    /// Transfer every file, not only the changed ones
    All,
}

/// Asks on the terminal.
struct Prompt;

impl Confirm for Prompt {
    fn confirm(&self, prompt: &str) -> bool {
        tokio::task::block_in_place(|| {
            print!("{prompt} [y/N] ");
            if std::io::stdout().flush().is_err() {
                return false;
            }
            let mut answer = String::new();
            if std::io::stdin().lock().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
        })
    }
}

/// Any error a run can end with.
enum Failure {
    Config(quill_config::error::Error),
    Remote(quill_remote::error::Error),
    Index(quill_index::error::Error),
    Sync(quill_sync::error::Error),
    Usage(String),
}

impl Failure {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Sync(err) => err.exit_code(),
            _ => 1,
        }
    }

    fn report(&self) {
        match self {
            Self::Config(err) => tracing::error!(error = ?err, "could not load configuration"),
            Self::Remote(err) => tracing::error!(error = ?err, "remote store unavailable"),
            Self::Index(err) => tracing::error!(error = ?err, "local index unavailable"),
            Self::Sync(err) => tracing::error!(error = ?err, "run aborted"),
            Self::Usage(message) => tracing::error!("{message}"),
        }
    }
}

impl From<quill_config::error::Error> for Failure {
    fn from(err: quill_config::error::Error) -> Self {
        Self::Config(err)
    }
}
impl From<quill_remote::error::Error> for Failure {
    fn from(err: quill_remote::error::Error) -> Self {
        Self::Remote(err)
    }
}
impl From<quill_index::error::Error> for Failure {
    fn from(err: quill_index::error::Error) -> Self {
        Self::Index(err)
    }
}
impl From<quill_sync::error::Error> for Failure {
    fn from(err: quill_sync::error::Error) -> Self {
        Self::Sync(err)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        "debug"
    } else if cli.silent {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(failure) => {
                failure.report();
                ExitCode::from(failure.exit_code())
            },
        },
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run future rolled back whatever was open.
            tracing::warn!("interrupted; open transactions were rolled back");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<(), Failure> {
    let config = Config::load(cli.config.as_deref())?;
    let ctx = context(&cli, config.max_packet_size);

    let index = match &config.index {
        Some(path) => Some(quill_index::Database::connect(path).await?),
        None => None,
    };
    if let Command::Log { limit } = cli.command {
        let Some(index) = index else {
            return Err(Failure::Usage("no local index is configured".to_string()));
        };
        for commit in Repository::from(&index).log(limit).await? {
            println!("{:>4}  {}  {}", commit.version, commit.committed_at, commit.message);
        }
        index.close().await;
        return Ok(());
    }

    let db = Database::connect_with(&config.database_url, config.reconnect_policy()).await?;
    let scanner = Scanner::new(&config.root, config.ignore.clone());
    let local: Box<dyn LocalState> = match &index {
        Some(index) => Box::new(IndexedState::new(scanner, Repository::from(index))),
        None => Box::new(ScanState::new(scanner)),
    };

    let result = dispatch(&ctx, &db, local.as_ref(), cli.command).await;
    db.close().await;
    if let Some(index) = index {
        index.close().await;
    }
    result
}

fn context(cli: &Cli, max_packet_size: u64) -> Context {
    if cli.force {
        Context::forced(max_packet_size)
    } else if cli.silent {
        // Nobody to ask: anything that needs consent is declined.
        Context::new(max_packet_size, Never)
    } else {
        Context::new(max_packet_size, Prompt)
    }
}

async fn dispatch(ctx: &Context, db: &Database, local: &dyn LocalState, command: Command) -> Result<(), Failure> {
    match command {
        Command::Diff => print_diff(&flow::diff(db, local).await?),
        Command::Get { scope } => {
            let mode = if scope.is_some() { GetMode::All } else { GetMode::Changes };
            print_outcome("get", flow::get(ctx, db, local, mode).await?, |stats: TransferStats| {
                format!("downloaded {stats}")
            });
        },
        Command::Give { scope } => {
            let mode = if scope.is_some() { GiveMode::All } else { GiveMode::Changes };
            print_outcome("give", flow::give(ctx, db, local, mode).await?, |report: GiveReport| {
                format!(
                    "{} new, {} updated, {} deleted; uploaded {}",
                    report.inserted, report.updated, report.deleted, report.transfer
                )
            });
        },
        Command::Init => {
            let report = flow::init(ctx, db, local).await?;
            println!("remote schema: {:?}", report.schema);
            if let Some(version) = report.index_version {
                println!("local index at version {version}");
            }
        },
        Command::Snapshot { at, dest } => {
            let at = OffsetDateTime::parse(&at, &Rfc3339)
                .map_err(|err| Failure::Usage(format!("invalid timestamp {at:?}: {err}")))?;
            print_outcome("snapshot", flow::snapshot(db, UtcDateTime::from(at), &dest).await?, |stats: TransferStats| {
                format!("restored {stats} into {}", dest.display())
            });
        },
        // Answered from the local index alone, before connecting.
        Command::Log { .. } => {},
    }
    Ok(())
}

fn print_diff(report: &DiffReport) {
    let files = &report.files;
    for path in &files.remote_only {
        println!("remote only  {path}");
    }
    for path in &files.local_only {
        println!("local only   {path}");
    }
    for path in &files.altered {
        println!("altered      {path}");
    }
    for path in &report.directories.remote_only {
        println!("remote only  {path}/");
    }
    for path in &report.directories.local_only {
        println!("local only   {path}/");
    }
    println!("files: {files}; directories: {}", report.directories);
}

fn print_outcome<T>(what: &str, outcome: Outcome<T>, describe: impl FnOnce(T) -> String) {
    match outcome {
        Outcome::Applied(value) => println!("{what}: {}", describe(value)),
        Outcome::NoData => println!("{what}: nothing to transfer"),
        Outcome::UpToDate => println!("{what}: already up to date"),
        Outcome::Declined => println!("{what}: cancelled, nothing changed"),
    }
}
