//! Insights CLI - command-line interface for the symptom insights engine
//!
//! Commands work against a JSON store snapshot:
//! - import: Append daily logs (NDJSON or JSON array) to the snapshot
//! - score / readiness: Readiness for one user and date
//! - score-all: Batch readiness for every user who logged on a date
//! - aggregate: Recompute cohort benchmarks
//! - benchmarks / correlations: Insights read API
//! - doctor: Diagnose snapshot and configuration

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use symptom_insights::{EngineConfig, EngineError, InsightsEngine, MemoryStore, ENGINE_VERSION};

/// Insights - readiness scores and cohort symptom benchmarks
#[derive(Parser)]
#[command(name = "insights")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Readiness scoring and cohort symptom benchmarks", long_about = None)]
struct Cli {
    /// Log level for the engine (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Store snapshot (JSON); created on first write if missing
    #[arg(short, long)]
    store: PathBuf,

    /// Engine config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append daily logs to the store
    Import {
        #[command(flatten)]
        store: StoreArgs,

        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Recompute and store readiness for one user and date
    Score {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(short, long)]
        user: String,

        /// Day to score (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Stored readiness, computed on demand when absent
    Readiness {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Score every user who logged on a date
    ScoreAll {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(short, long)]
        date: NaiveDate,
    },

    /// Recompute cohort benchmarks
    Aggregate {
        #[command(flatten)]
        store: StoreArgs,

        /// Reference date (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// A user's symptoms against their cohort
    Benchmarks {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(short, long)]
        user: String,

        /// Reference date (defaults to today, UTC)
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Stored factor/symptom correlations for a user
    Correlations {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(short, long)]
        user: String,
    },

    /// Diagnose snapshot and configuration
    Doctor {
        /// Check a store snapshot
        #[arg(long)]
        store: Option<PathBuf>,

        /// Check a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("symptom_insights={}", level.to_lowercase())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), InsightsCliError> {
    match command {
        Commands::Import { store, input } => {
            let mut engine = open_engine(&store)?;
            let payload = read_input(&input)?;
            let count = engine.import_logs(&payload)?;
            save_engine(&engine, &store.store)?;
            print_json(&serde_json::json!({ "imported": count }))
        }
        Commands::Score { store, user, date } => {
            let mut engine = open_engine(&store)?;
            let score = engine.score_day(&user, date)?;
            save_engine(&engine, &store.store)?;
            print_optional(score, &user, date)
        }
        Commands::Readiness { store, user, date } => {
            let mut engine = open_engine(&store)?;
            let score = engine.readiness(&user, date)?;
            save_engine(&engine, &store.store)?;
            print_optional(score, &user, date)
        }
        Commands::ScoreAll { store, date } => {
            let mut engine = open_engine(&store)?;
            let report = engine.score_all(date)?;
            save_engine(&engine, &store.store)?;
            print_json(&report)
        }
        Commands::Aggregate { store, today } => {
            let mut engine = open_engine(&store)?;
            let report = engine.run_benchmarks(resolve_today(today));
            save_engine(&engine, &store.store)?;
            print_json(&report)?;
            match report.fatal {
                Some(message) => Err(InsightsCliError::AggregationAborted(message)),
                None => Ok(()),
            }
        }
        Commands::Benchmarks { store, user, today } => {
            let engine = open_engine(&store)?;
            let insights = engine.benchmark_insights(&user, resolve_today(today))?;
            print_json(&insights)
        }
        Commands::Correlations { store, user } => {
            let engine = open_engine(&store)?;
            let correlations = engine.correlation_insights(&user)?;
            print_json(&correlations)
        }
        Commands::Doctor {
            store,
            config,
            json,
        } => cmd_doctor(store.as_deref(), config.as_deref(), json),
    }
}

fn resolve_today(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(|| Utc::now().date_naive())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, InsightsCliError> {
    match path {
        Some(path) => Ok(EngineConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::default()),
    }
}

fn open_engine(args: &StoreArgs) -> Result<InsightsEngine<MemoryStore>, InsightsCliError> {
    let config = load_config(args.config.as_deref())?;
    if !args.store.exists() {
        debug!(path = %args.store.display(), "store snapshot missing, starting empty");
        return Ok(InsightsEngine::with_config(MemoryStore::new(), config)?);
    }
    let snapshot = fs::read_to_string(&args.store)?;
    Ok(InsightsEngine::from_snapshot(&snapshot, config)?)
}

fn save_engine(engine: &InsightsEngine<MemoryStore>, path: &Path) -> Result<(), InsightsCliError> {
    fs::write(path, engine.snapshot()?)?;
    info!(path = %path.display(), "store snapshot saved");
    Ok(())
}

fn read_input(path: &Path) -> Result<String, InsightsCliError> {
    if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), InsightsCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_optional<T: Serialize>(
    value: Option<T>,
    user_id: &str,
    date: NaiveDate,
) -> Result<(), InsightsCliError> {
    match value {
        Some(value) => print_json(&value),
        None => print_json(&serde_json::json!({
            "status": "no_data",
            "user_id": user_id,
            "date": date,
        })),
    }
}

fn cmd_doctor(
    store: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), InsightsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Engine version {}", ENGINE_VERSION),
    });

    if let Some(config_path) = config {
        let check = match fs::read_to_string(config_path) {
            Ok(content) => match EngineConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (min cohort {}, windows {}d/{}d)",
                        config.min_cohort_size,
                        config.recent_window_days,
                        config.benchmark_window_days
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        };
        checks.push(check);
    }

    if let Some(store_path) = store {
        let check = if !store_path.exists() {
            DoctorCheck {
                name: "store".to_string(),
                status: CheckStatus::Warning,
                message: "Store snapshot does not exist".to_string(),
            }
        } else {
            match fs::read_to_string(store_path) {
                Ok(content) => match MemoryStore::from_json(&content) {
                    Ok(snapshot) => DoctorCheck {
                        name: "store".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Store valid ({} logs, {} profiles ({} onboarded), {} scores, {} benchmark rows)",
                            snapshot.logs.len(),
                            snapshot.profiles.len(),
                            snapshot
                                .profiles
                                .iter()
                                .filter(|p| p.onboarding_complete)
                                .count(),
                            snapshot.scores.len(),
                            snapshot.benchmarks.len()
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "store".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "store".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read store snapshot: {}", e),
                },
            }
        };
        checks.push(check);
    }

    // Import reads stdin when given `--input -`
    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (import from - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Insights Doctor Report");
        println!("======================");
        println!("Version: {}", report.version);
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
        Err(InsightsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum InsightsCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    AggregationAborted(String),
    DoctorFailed,
}

impl From<io::Error> for InsightsCliError {
    fn from(e: io::Error) -> Self {
        InsightsCliError::Io(e)
    }
}

impl From<EngineError> for InsightsCliError {
    fn from(e: EngineError) -> Self {
        InsightsCliError::Engine(e)
    }
}

impl From<serde_json::Error> for InsightsCliError {
    fn from(e: serde_json::Error) -> Self {
        InsightsCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<InsightsCliError> for CliError {
    fn from(e: InsightsCliError) -> Self {
        match e {
            InsightsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            InsightsCliError::Engine(e) => {
                let (code, hint) = match &e {
                    EngineError::Store(_) => ("STORE_ERROR", "Run 'insights doctor --store <file>'"),
                    EngineError::Json(_) | EngineError::ParseError(_) => {
                        ("PARSE_ERROR", "Ensure input is NDJSON or a JSON array of daily logs")
                    }
                    EngineError::InvalidConfig(_) => ("CONFIG_ERROR", "Check the config file values"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            InsightsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            InsightsCliError::AggregationAborted(message) => CliError {
                code: "AGGREGATION_ABORTED".to_string(),
                message,
                hint: Some("The store could not be read; the next run will retry".to_string()),
            },
            InsightsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
