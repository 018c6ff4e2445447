//! FIM-030: CLI subcommands — check, status, completions.

use crate::core::checksums::FingerprintStore;
use crate::core::config::{self, FimConfig};
use crate::core::state::MetadataStore;
use crate::core::types::{MetadataRecord, ReportedActor};
use crate::tripwire::engine::IntegrityEngine;
use clap::Subcommand;
use indexmap::IndexMap;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one integrity pass over a file
    Check {
        /// File to monitor (prompted on stdin when omitted)
        path: Option<PathBuf>,

        /// Path to fimwatch.yaml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State directory (overrides the config)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored baselines
    Status {
        /// Path to fimwatch.yaml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State directory (overrides the config)
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Fail on malformed store lines instead of skipping them
        #[arg(long)]
        strict: bool,

        /// Print baselines as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Check {
            path,
            config,
            state_dir,
            json,
        } => cmd_check(path, config.as_deref(), state_dir, json),
        Commands::Status {
            config,
            state_dir,
            strict,
            json,
        } => cmd_status(config.as_deref(), state_dir, strict, json),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

fn resolve_config(explicit: Option<&Path>, state_dir: Option<PathBuf>) -> Result<FimConfig, String> {
    let mut config = config::load_config(explicit).map_err(|e| e.to_string())?;
    if let Some(dir) = state_dir {
        config.state_dir = dir;
    }
    Ok(config)
}

/// Read one whitespace-delimited token after prompting.
pub fn prompt_path(input: &mut impl BufRead, output: &mut impl Write) -> Option<PathBuf> {
    let _ = write!(output, "Enter file name to monitor: ");
    let _ = output.flush();
    let mut line = String::new();
    input.read_line(&mut line).ok()?;
    line.split_whitespace().next().map(PathBuf::from)
}

/// One pass; the outcome never changes the exit status.
fn cmd_check(
    path: Option<PathBuf>,
    config_path: Option<&Path>,
    state_dir: Option<PathBuf>,
    json: bool,
) -> Result<(), String> {
    let config = match resolve_config(config_path, state_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(());
        }
    };

    let path = match path {
        Some(path) => path,
        None => {
            let stdin = std::io::stdin();
            match prompt_path(&mut stdin.lock(), &mut std::io::stdout()) {
                Some(path) => path,
                None => {
                    eprintln!("Error: no file name given");
                    return Ok(());
                }
            }
        }
    };

    let engine = IntegrityEngine::from_config(&config);
    let actor = ReportedActor::from_env();
    log::info!("checking {} as {}", path.display(), actor);

    match engine.run_pass(&path, &actor) {
        Ok(report) if json => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Error: cannot serialize report: {}", e),
        },
        Ok(report) => println!("{}", report),
        Err(e) => eprintln!("Error: {}", e),
    }
    Ok(())
}

/// Merged per-path view of both stores.
#[derive(Debug, Default, Serialize)]
struct Baseline {
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MetadataRecord>,
}

fn cmd_status(
    config_path: Option<&Path>,
    state_dir: Option<PathBuf>,
    strict: bool,
    json: bool,
) -> Result<(), String> {
    let config = resolve_config(config_path, state_dir)?;
    let checksums = FingerprintStore::new(config.fingerprint_store_path());
    let metadata = MetadataStore::new(config.metadata_store_path());

    let (fingerprints, records) = if strict {
        (checksums.load_strict(), metadata.load_strict())
    } else {
        (checksums.load(), metadata.load())
    };
    let fingerprints = fingerprints.map_err(|e| e.to_string())?;
    let records = records.map_err(|e| e.to_string())?;

    let mut merged: IndexMap<String, Baseline> = IndexMap::new();
    for (path, record) in fingerprints {
        merged.entry(path).or_default().fingerprint = Some(record.fingerprint.to_string());
    }
    for (path, record) in records {
        merged.entry(path).or_default().metadata = Some(record);
    }

    if json {
        let text = serde_json::to_string_pretty(&merged)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }

    if merged.is_empty() {
        println!(
            "No baselines in {}. Run `fimwatch check <file>` first.",
            config.state_dir.display()
        );
        return Ok(());
    }

    println!("State: {} ({} paths)", config.state_dir.display(), merged.len());
    for (path, baseline) in &merged {
        let fingerprint = baseline.fingerprint.as_deref().unwrap_or("-");
        match &baseline.metadata {
            Some(m) => println!(
                "  {}: {} [mode {:04o} uid {} gid {} mtime {}] by {}",
                path, fingerprint, m.permissions, m.uid, m.gid, m.mtime, m.recorded_actor
            ),
            None => println!("  {}: {} [no metadata baseline]", path, fingerprint),
        }
    }
    Ok(())
}

fn cmd_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    let mut cmd = crate::cli::Cli::command();
    clap_complete::generate(shell, &mut cmd, "fimwatch", &mut std::io::stdout());
}

/// Top-level argument parser.
#[derive(clap::Parser, Debug)]
#[command(
    name = "fimwatch",
    version,
    about = "File integrity monitor — content fingerprints, metadata baselines, attribution-aware alerts"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}
