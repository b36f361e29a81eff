//! rewind CLI - checkpoint, diff and roll back a workspace

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rewind::{CheckpointEngine, EngineConfig, Workspace};

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "shadow snapshot history for a working directory")]
#[command(version)]
struct Cli {
    /// config file (toml)
    #[arg(short, long, env = "REWIND_CONFIG")]
    config: Option<PathBuf>,

    /// directory to track
    #[arg(short, long, env = "REWIND_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// root directory for checkpoint storage
    #[arg(short, long, env = "REWIND_STORAGE")]
    storage: Option<PathBuf>,

    /// extra exclusion rules, one pattern per line
    #[arg(short, long, env = "REWIND_RULES")]
    rules: Option<PathBuf>,

    /// append logs to this file instead of stderr
    #[arg(long, env = "REWIND_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// snapshot the workspace as a new checkpoint
    Create {
        #[arg(short, long)]
        message: Option<String>,
    },

    /// list checkpoints, newest first
    List {
        /// maximum number of checkpoints to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// show file changes between two checkpoints, or against the workspace
    ///
    /// checkpoints are named by id or by snapshot ref as shown by `list`
    Diff {
        from: String,
        to: Option<String>,
    },

    /// restore the workspace to a checkpoint, by id or snapshot ref
    Rollback { id: String },

    /// show the latest checkpoint and storage locations
    Status,

    /// forget checkpoints older than the given number of days
    Prune { days: u32 },

    /// print the identity a directory is stored under
    Identity {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_ref()) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_file: Option<&PathBuf>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_writer(file).with_ansi(false).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_config(cli: &Cli) -> rewind::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::new(cli.workspace.clone().unwrap_or_else(|| PathBuf::from("."))),
    };

    if let Some(workspace) = &cli.workspace {
        config.workspace = workspace.clone();
    }
    if let Some(storage) = &cli.storage {
        config.storage_root = storage.clone();
    }
    if let Some(rules) = &cli.rules {
        config.rules_file = Some(rules.clone());
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> rewind::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// returns whether the command succeeded
fn run(cli: Cli) -> rewind::Result<bool> {
    if let Commands::Identity { path } = &cli.command {
        print_json(&Workspace::resolve(path)?)?;
        return Ok(true);
    }

    let config = load_config(&cli)?;
    let engine = CheckpointEngine::open(&config)?;

    match cli.command {
        Commands::Create { message } => {
            print_json(&engine.create_checkpoint(message.as_deref())?)?;
        }

        Commands::List { limit } => {
            print_json(&engine.list_checkpoints(limit)?)?;
        }

        Commands::Diff { from, to } => {
            let from = engine.checkpoint_id(&from)?;
            let to = to.map(|to| engine.checkpoint_id(&to)).transpose()?;
            print_json(&engine.diff(&from, to.as_deref())?)?;
        }

        Commands::Rollback { id } => {
            let id = engine.checkpoint_id(&id).unwrap_or(id);
            let outcome = engine.rollback(&id);
            print_json(&outcome)?;
            return Ok(outcome.success);
        }

        Commands::Status => {
            print_json(&engine.status()?)?;
        }

        Commands::Prune { days } => {
            print_json(&engine.prune(days)?)?;
        }

        Commands::Identity { .. } => {}
    }

    Ok(true)
}
