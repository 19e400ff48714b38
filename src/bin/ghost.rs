//! Ghost CLI - command-line access to the run tracking core
//!
//! Commands:
//! - signup: Create a user document with zeroed statistics
//! - replay: Replay recorded position fixes as a run and commit it
//! - stats: Show a user's statistics
//! - runs: List a user's saved runs
//! - rollup: Merge a run record into a snapshot without any store
//! - doctor: Diagnose configuration and store health

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ghost_core::accumulator::RunAccumulator;
use ghost_core::persistence::{DocumentStore, JsonFileStore, PersistencePort, RemoteStore, TreePath};
use ghost_core::tracker::commit_run;
use ghost_core::types::{AggregateSnapshot, Period, PositionFix, RecordId, RunRecord, UserId};
use ghost_core::{social, AuthenticatedSession, GhostConfig, GhostError, StatsRollup, GHOST_VERSION};

/// Ghost - run tracking and driving statistics
#[derive(Parser)]
#[command(name = "ghost")]
#[command(version = GHOST_VERSION)]
#[command(about = "Track runs and roll up driving statistics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user document with zeroed statistics
    Signup {
        /// Store file (JSON document tree)
        #[arg(long)]
        store: PathBuf,

        /// User id
        #[arg(long)]
        user: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Display name, also used as the username
        #[arg(long)]
        name: String,
    },

    /// Replay recorded position fixes (NDJSON) as one run and commit it
    Replay {
        /// Store file (JSON document tree)
        #[arg(long)]
        store: PathBuf,

        /// User id
        #[arg(long)]
        user: String,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Session length in seconds (defaults to the span of fix timestamps)
        #[arg(long)]
        duration_secs: Option<u64>,

        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a user's statistics
    Stats {
        /// Store file (JSON document tree)
        #[arg(long)]
        store: PathBuf,

        /// User id
        #[arg(long)]
        user: String,

        /// Period to show (today, week, month, year); all when omitted
        #[arg(long)]
        period: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List a user's saved runs
    Runs {
        /// Store file (JSON document tree)
        #[arg(long)]
        store: PathBuf,

        /// User id
        #[arg(long)]
        user: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge a run record into a snapshot and print the result
    Rollup {
        /// Previous snapshot (JSON)
        #[arg(long)]
        previous: PathBuf,

        /// Completed run record (JSON)
        #[arg(long)]
        record: PathBuf,
    },

    /// Diagnose configuration and store health
    Doctor {
        /// Check a store file
        #[arg(long)]
        store: Option<PathBuf>,

        /// Check a configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            report(GhostCliError::Io(e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(e);
            ExitCode::FAILURE
        }
    }
}

fn report(e: GhostCliError) {
    eprintln!(
        "{}",
        serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
    );
}

async fn run(cli: Cli) -> Result<(), GhostCliError> {
    match cli.command {
        Commands::Signup {
            store,
            user,
            email,
            name,
        } => cmd_signup(&store, user, email, &name).await,

        Commands::Replay {
            store,
            user,
            input,
            duration_secs,
            config,
        } => cmd_replay(&store, user, &input, duration_secs, config.as_deref()).await,

        Commands::Stats {
            store,
            user,
            period,
            json,
        } => cmd_stats(&store, user, period.as_deref(), json).await,

        Commands::Runs { store, user, json } => cmd_runs(&store, user, json).await,

        Commands::Rollup { previous, record } => cmd_rollup(&previous, &record),

        Commands::Doctor {
            store,
            config,
            json,
        } => cmd_doctor(store.as_deref(), config.as_deref(), json).await,
    }
}

async fn cmd_signup(
    store: &Path,
    user: String,
    email: String,
    name: &str,
) -> Result<(), GhostCliError> {
    let store = JsonFileStore::open(store);
    let session = AuthenticatedSession::new(user, email).with_display_name(name);
    let profile = social::create_profile(&store, &session, name).await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

async fn cmd_replay(
    store: &Path,
    user: String,
    input: &Path,
    duration_secs: Option<u64>,
    config: Option<&Path>,
) -> Result<(), GhostCliError> {
    let config = match config {
        Some(path) => GhostConfig::load(path)?,
        None => GhostConfig::default(),
    };

    let input_data = read_input(input)?;
    let fixes = parse_fixes(&input_data)?;

    let started_at = fixes
        .first()
        .map(|f| f.timestamp)
        .unwrap_or_else(chrono::Utc::now);
    let mut acc = RunAccumulator::new(started_at);
    for fix in &fixes {
        acc.on_fix(fix);
    }

    // Recorded fixes carry no timer, so their timestamp span stands in for it
    let span = match (fixes.first(), fixes.last()) {
        (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_seconds().max(0) as u64,
        _ => 0,
    };
    acc.set_elapsed(duration_secs.unwrap_or(span));

    let saved_at = fixes.last().map(|f| f.timestamp).unwrap_or(started_at);
    let record = acc.state().to_record(RecordId::new(), saved_at);

    let remote = RemoteStore::new(JsonFileStore::open(store));
    let outcome = commit_run(
        &remote,
        &UserId::new(user),
        &record,
        config.tracker.remote_timeout(),
    )
    .await?;

    let summary = ReplaySummary {
        record_id: outcome.record_id.to_string(),
        fixes: fixes.len(),
        distance_miles: record.distance_miles,
        top_speed_mph: record.top_speed_mph,
        duration_secs: record.duration_secs,
        already_applied: outcome.already_applied,
        snapshot: outcome.snapshot,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_stats(
    store: &Path,
    user: String,
    period: Option<&str>,
    json: bool,
) -> Result<(), GhostCliError> {
    let remote = RemoteStore::new(JsonFileStore::open(store));
    let snapshot = remote.read_snapshot(&UserId::new(user.as_str())).await?;

    let periods: Vec<Period> = match period {
        Some(p) => vec![p.parse()?],
        None => Period::ALL.to_vec(),
    };
    let views: Vec<_> = periods.iter().map(|p| snapshot.view(*p)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        println!("Stats for {user}");
        println!("==========={}", "=".repeat(user.len()));
        for view in &views {
            println!(
                "  {:<6} {:>9.2} mi  {:>9.1} min",
                view.period.as_str(),
                view.miles,
                view.minutes
            );
        }
        println!("  Fastest speed: {:.1} mph", snapshot.fastest_speed_all_time);
    }
    Ok(())
}

async fn cmd_runs(store: &Path, user: String, json: bool) -> Result<(), GhostCliError> {
    let remote = RemoteStore::new(JsonFileStore::open(store));
    let runs = remote.list_runs(&UserId::new(user.as_str())).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!("Runs for {user}: {}", runs.len());
    for run in &runs {
        println!(
            "  {} {}  {:>7.2} mi  {:>6} s  top {:.1} mph  ({} points)",
            run.saved_at.format("%Y-%m-%d %H:%M"),
            run.id,
            run.distance_miles,
            run.duration_secs,
            run.top_speed_mph,
            run.route.len()
        );
    }
    Ok(())
}

fn cmd_rollup(previous: &Path, record: &Path) -> Result<(), GhostCliError> {
    let previous: AggregateSnapshot = serde_json::from_str(&fs::read_to_string(previous)?)?;
    let record: RunRecord = serde_json::from_str(&fs::read_to_string(record)?)?;

    let next = StatsRollup::apply(&previous, &record);
    println!("{}", serde_json::to_string_pretty(&next)?);
    Ok(())
}

async fn cmd_doctor(
    store: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), GhostCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "ghost_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Ghost version {}", GHOST_VERSION),
    });

    if let Some(config_path) = config {
        checks.push(match GhostConfig::load(config_path) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (filter {} m, timeout {} ms, accent {})",
                    config.tracker.distance_filter_meters,
                    config.tracker.remote_timeout_ms,
                    config.theme.accent
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid config: {}", e),
            },
        });
    }

    if let Some(store_path) = store {
        if store_path.exists() {
            let file = JsonFileStore::open(store_path);
            checks.push(match file.get(&TreePath::users()).await {
                Ok(users) => {
                    let count = users
                        .as_ref()
                        .and_then(|u| u.as_object())
                        .map(|u| u.len())
                        .unwrap_or(0);
                    DoctorCheck {
                        name: "store".to_string(),
                        status: CheckStatus::Ok,
                        message: format!("Store readable ({} users)", count),
                    }
                }
                Err(e) => DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Store unreadable: {}", e),
                },
            });
        } else {
            checks.push(DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Warning,
                message: "Store file does not exist yet".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input to replay)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (replay ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: GHOST_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Ghost Doctor Report");
        println!("===================");
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(GhostCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, GhostCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_fixes(input: &str) -> Result<Vec<PositionFix>, GhostCliError> {
    let mut fixes = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fix: PositionFix = serde_json::from_str(trimmed).map_err(|e| {
            GhostCliError::ParseError(format!("line {}: {}", index + 1, e))
        })?;
        fixes.push(fix);
    }
    Ok(fixes)
}

// Error types

#[derive(Debug)]
enum GhostCliError {
    Io(io::Error),
    Core(GhostError),
    Json(serde_json::Error),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for GhostCliError {
    fn from(e: io::Error) -> Self {
        GhostCliError::Io(e)
    }
}

impl From<GhostError> for GhostCliError {
    fn from(e: GhostError) -> Self {
        GhostCliError::Core(e)
    }
}

impl From<serde_json::Error> for GhostCliError {
    fn from(e: serde_json::Error) -> Self {
        GhostCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GhostCliError> for CliError {
    fn from(e: GhostCliError) -> Self {
        match e {
            GhostCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GhostCliError::Core(e) => {
                let (code, hint) = match &e {
                    GhostError::NotFound(_) => ("NOT_FOUND", Some("Run 'ghost signup' first")),
                    GhostError::Commit { .. } if e.is_retryable() => {
                        ("COMMIT_FAILED", Some("The run was not counted; retry the command"))
                    }
                    GhostError::Commit { .. } => ("COMMIT_FAILED", None),
                    GhostError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", Some("Run 'ghost doctor --config FILE'"))
                    }
                    GhostError::InvalidInput(_) => ("INVALID_INPUT", None),
                    _ => ("GHOST_ERROR", None),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: hint.map(str::to_string),
                }
            }
            GhostCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GhostCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            GhostCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some(
                    "Each line must be {\"latitude\", \"longitude\", \"timestamp\", \"speed_mps\"}"
                        .to_string(),
                ),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ReplaySummary {
    record_id: String,
    fixes: usize,
    distance_miles: f64,
    top_speed_mph: f64,
    duration_secs: u64,
    already_applied: bool,
    snapshot: AggregateSnapshot,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
