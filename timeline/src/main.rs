//! Command-line front end for the timeline scheduler.
//!
//! Loads a JSON experiment definition, builds the chunk tree with the plugins
//! and predicates named in the TOML config, and either checks it, prints its
//! outline, or runs a dry session that answers every trial with its own
//! parameters.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use timeline::core::chunk::Timeline;
use timeline::core::factory::ChunkFactory;
use timeline::error::SchedulerError;
use timeline::exit_codes;
use timeline::io::config::{SessionConfig, load_config};
use timeline::io::definition_store::load_definition;
use timeline::outline::outline;
use timeline::session::{Session, SessionStep};

#[derive(Parser)]
#[command(
    name = "timeline",
    version,
    about = "Nested trial scheduler for behavioral experiments"
)]
struct Cli {
    /// Session config (TOML). Defaults apply when omitted or missing.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the timeline and report its size.
    Validate { definition: PathBuf },
    /// Print the chunk tree with identity paths and trial counts.
    Outline { definition: PathBuf },
    /// Run a dry session and print one line per delivered trial.
    Simulate { definition: PathBuf },
}

fn main() {
    timeline::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SchedulerError>() {
        Some(SchedulerError::TrialLimitExceeded { .. }) => exit_codes::TRIAL_LIMIT,
        _ => exit_codes::INVALID,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path).context("load config")?,
        None => SessionConfig::default(),
    };
    match &cli.command {
        Command::Validate { definition } => cmd_validate(&config, definition),
        Command::Outline { definition } => cmd_outline(&config, definition),
        Command::Simulate { definition } => cmd_simulate(&config, definition),
    }
}

fn build(config: &SessionConfig, definition: &Path) -> Result<Timeline> {
    let definition = load_definition(definition)?;
    let registry = config.build_registry();
    let timeline = ChunkFactory::new(&registry)
        .with_options(config.factory_options())
        .build(&definition)
        .context("build timeline")?;
    Ok(timeline)
}

fn cmd_validate(config: &SessionConfig, definition: &Path) -> Result<()> {
    let timeline = build(config, definition)?;
    println!(
        "ok: {} trials in {} chunks",
        timeline.length(),
        timeline.chunk_count()
    );
    Ok(())
}

fn cmd_outline(config: &SessionConfig, definition: &Path) -> Result<()> {
    let timeline = build(config, definition)?;
    for entry in outline(&timeline) {
        println!("{entry}");
    }
    Ok(())
}

fn cmd_simulate(config: &SessionConfig, definition: &Path) -> Result<()> {
    let timeline = build(config, definition)?;
    let mut session = Session::new(timeline).with_max_trials(config.max_trials);

    let mut step = session.start().context("start session")?;
    while let SessionStep::Trial(trial) = step {
        let progress = session.progress();
        let chunk_id = session.current_chunk_id();
        if config.show_progress {
            println!(
                "{}\t{}\t{}\t{:.0}%",
                progress.current_trial_global,
                chunk_id,
                trial.plugin,
                progress.percent_complete()
            );
        } else {
            println!(
                "{}\t{}\t{}",
                progress.current_trial_global, chunk_id, trial.plugin
            );
        }
        step = session
            .finish_trial(trial.params.clone())
            .with_context(|| format!("simulate trial {}", progress.current_trial_global))?;
    }

    eprintln!(
        "simulated {} trials in {} ms",
        session.data().len(),
        session.total_time().as_millis()
    );
    Ok(())
}
