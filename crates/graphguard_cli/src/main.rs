//! Command-line front end for graphguard.
//!
//! # Responsibility
//! - Check every rule of a model against a SQLite population and print the
//!   violations as JSON.
//! - Report the core version.

use clap::{Parser, Subcommand};
use graphguard_core::{
    core_version, init_logging, rule_engine, EngineSettings, Model, Rule, Runtime, SqliteStorage,
};
use log::info;
use serde_json::json;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

/// Exit code when at least one invariant rule is violated.
const EXIT_INVARIANT_VIOLATED: u8 = 2;

/// graphguard - relational integrity checks over graph-structured data
#[derive(Parser, Debug)]
#[command(name = "graphguard")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every rule of a model and print the violations
    Check {
        /// Path to the model JSON file
        #[arg(long)]
        model: PathBuf,

        /// Path to the SQLite population database
        #[arg(long)]
        db: PathBuf,

        /// Path to an engine settings JSON file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Absolute directory for diagnostic log files
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Storage id the model refers to for the population database
        #[arg(long, default_value = "main")]
        storage_id: String,

        /// Re-evaluate every conjunct and persist the refreshed cache
        #[arg(long)]
        refresh: bool,
    },

    /// Print the core version
    Version,
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    match cli.command {
        Command::Check {
            model,
            db,
            settings,
            log_dir,
            storage_id,
            refresh,
        } => {
            if let Some(log_dir) = log_dir {
                init_logging(graphguard_core::default_log_level(), log_dir)?;
            }
            check(&model, &db, settings.as_deref(), storage_id, refresh)
        }
        Command::Version => {
            println!("graphguard {}", core_version());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn check(
    model_path: &Path,
    db_path: &Path,
    settings_path: Option<&Path>,
    storage_id: String,
    refresh: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    let model = Model::from_path(model_path)?;
    let settings = match settings_path {
        Some(path) => EngineSettings::from_path(path)?,
        None => EngineSettings::default(),
    };

    let storage = SqliteStorage::open(storage_id, db_path)?;
    let cache_pool = storage.cache_pool();
    let runtime = Runtime::builder(model)
        .storage(Rc::new(storage))
        .cache_pool(Rc::new(cache_pool))
        .settings(settings)
        .build()?;

    if refresh {
        let conjuncts = runtime.model().conjuncts();
        for conjunct in conjuncts {
            conjunct.evaluate(&runtime)?;
        }
        runtime
            .cache()
            .commit(conjuncts.iter().map(|conjunct| conjunct.id()))?;
    }

    let rules: Vec<&Rule> = runtime.model().rules().iter().collect();
    let violations = rule_engine::get_violations_from_cache(&runtime, &rules)?;
    runtime.cache().discard();

    let invariant_violations = violations
        .iter()
        .filter(|violation| violation.rule().is_invariant())
        .count();
    info!(
        "event=cli_check module=cli status=ok rules={} violations={} invariant_violations={}",
        rules.len(),
        violations.len(),
        invariant_violations
    );

    let report = json!({
        "rules_checked": rules.len(),
        "violations": rule_engine::report(&violations),
        "user_log": runtime.user_log().drain(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if invariant_violations > 0 {
        Ok(ExitCode::from(EXIT_INVARIANT_VIOLATED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
