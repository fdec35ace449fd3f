//! Command-line player for declaratively authored hands-on labs.
//!
//! Loads a lab document, checks it, and replays scripted learner submissions
//! through a [`Session`](labrunner::session::Session).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use labrunner::core::vars::draw;
use labrunner::exit_codes;
use labrunner::io::config::{PlayerConfig, load_config};
use labrunner::io::lab_store::load_lab;
use labrunner::io::render::CardRenderer;
use labrunner::io::script::load_script;
use labrunner::logging;
use labrunner::play::replay;
use labrunner::session::Session;

#[derive(Parser)]
#[command(name = "labrunner", version, about = "Interpreter for hands-on lab documents")]
struct Cli {
    /// Player configuration (TOML). Missing file means defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a lab against the schema and report authoring defects.
    Validate { lab: PathBuf },
    /// Print the variable bindings drawn for a seed.
    Vars {
        lab: PathBuf,
        #[arg(long)]
        seed: String,
    },
    /// Render step cards for a seed.
    Show {
        lab: PathBuf,
        #[arg(long)]
        seed: String,
        /// Render only this step.
        #[arg(long)]
        step: Option<String>,
    },
    /// Replay a submission script and print the results.
    Play {
        lab: PathBuf,
        #[arg(long)]
        script: PathBuf,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID)
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PlayerConfig::default(),
    };
    match cli.command {
        Command::Validate { lab } => cmd_validate(&lab, &config),
        Command::Vars { lab, seed } => cmd_vars(&lab, &seed, &config),
        Command::Show { lab, seed, step } => cmd_show(&lab, &seed, step.as_deref(), config),
        Command::Play { lab, script } => cmd_play(&lab, &script, config),
    }
}

fn cmd_validate(lab: &Path, config: &PlayerConfig) -> Result<u8> {
    let loaded = load_lab(lab, &config.expression)?;
    for note in &loaded.lint.notes {
        eprintln!("note: {note}");
    }
    if !loaded.lint.is_clean() {
        eprintln!("lint errors:\n- {}", loaded.lint.errors.join("\n- "));
        return Ok(exit_codes::INVALID);
    }
    println!("ok: {} ({} steps)", loaded.doc.lab.id, loaded.doc.lab.steps.len());
    Ok(exit_codes::OK)
}

fn cmd_vars(lab: &Path, seed: &str, config: &PlayerConfig) -> Result<u8> {
    let loaded = load_lab(lab, &config.expression)?;
    print_json(&draw(&loaded.doc.lab.variables, seed))?;
    Ok(exit_codes::OK)
}

fn cmd_show(lab: &Path, seed: &str, step: Option<&str>, config: PlayerConfig) -> Result<u8> {
    let loaded = load_lab(lab, &config.expression)?;
    let session = Session::new(&loaded.doc, seed, config);
    let rendered = CardRenderer::new()?.render_session(&session, step)?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_play(lab: &Path, script: &Path, config: PlayerConfig) -> Result<u8> {
    let loaded = load_lab(lab, &config.expression)?;
    let script = load_script(script)?;
    let outcome = replay(&loaded.doc, &script, config);
    print_json(&outcome)?;
    Ok(if outcome.finished() {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
