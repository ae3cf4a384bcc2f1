//! `gg`: a command-line driver for the execution graph.
//!
//! Loads a thunk closure from a filesystem-backed [`gg_store::FilesystemThunkStore`]
//! into a fresh [`gg_core::ExecutionGraph`], reports the order-one frontier,
//! and -- since the graph itself is never persisted (it is rebuilt from the
//! store on every run) -- replays a whole batch of reduction reports from a
//! file in one process so the graph stays alive across all of them.
//!
//! This binary is a CLI frontend kept deliberately separate from the core
//! graph crate: it owns no graph logic of its own, it just drives
//! `gg_core::ExecutionGraph`'s public API end to end.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use gg_core::{ExecutionGraph, Hash};
use gg_store::FilesystemThunkStore;

/// The execution-graph driver.
#[derive(Parser)]
#[command(name = "gg", about = "Drive the content-addressed execution graph")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Register a thunk closure and replay reduction reports against it.
    Run {
        /// Root directory of the filesystem thunk store.
        #[arg(short, long)]
        store: PathBuf,

        /// Root thunk hash to add, e.g. `Tabc123`.
        #[arg(short, long)]
        root: String,

        /// Path to a JSON file of reduction reports to replay in order.
        /// Each element is `{"from": "<hash>", "to": [{"hash": "<hash>", "name": "<output>"}]}`.
        /// Omit to just register the closure and print the initial frontier.
        #[arg(long)]
        reductions: Option<PathBuf>,

        /// Log every thunk rehash as it happens.
        #[arg(long)]
        log_renames: bool,
    },
}

/// One step of a replayed session: either the initial frontier, or the
/// outcome of one reduction report.
#[derive(Serialize)]
struct StepReport {
    step: String,
    executable: Vec<String>,
    removed: Vec<String>,
}

/// One entry of a reductions file.
#[derive(Deserialize)]
struct ReductionReport {
    from: String,
    to: Vec<OutputEntry>,
}

#[derive(Deserialize)]
struct OutputEntry {
    hash: String,
    name: String,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Run {
            store,
            root,
            reductions,
            log_renames,
        } => run(&store, &root, reductions.as_deref(), log_renames),
    };
    process::exit(exit_code);
}

/// Executes the `run` subcommand.
///
/// Returns exit code: 0 = success, 1 = graph error, 2 = bad input, 3 = I/O error.
fn run(store_root: &PathBuf, root: &str, reductions: Option<&std::path::Path>, log_renames: bool) -> i32 {
    let root_hash = match Hash::parse(root.to_string()) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: invalid root hash '{root}': {e}");
            return 2;
        }
    };

    let store = match FilesystemThunkStore::new(store_root.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to open store '{}': {}", store_root.display(), e);
            return 3;
        }
    };

    let mut graph = ExecutionGraph::new(store, log_renames);

    let initial = match graph.add_thunk(&root_hash) {
        Ok(frontier) => frontier,
        Err(e) => {
            eprintln!("Error: failed to register root thunk: {e}");
            return 1;
        }
    };

    print_step("add_thunk", &initial, &[]);

    let Some(reductions_path) = reductions else {
        return 0;
    };

    let reports = match load_reductions(reductions_path) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("Error: failed to read reductions file: {e}");
            return 2;
        }
    };

    for report in reports {
        let from = match Hash::parse(report.from.clone()) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("Error: invalid 'from' hash '{}': {e}", report.from);
                return 2;
            }
        };
        let mut to = Vec::with_capacity(report.to.len());
        for entry in report.to {
            match Hash::parse(entry.hash.clone()) {
                Ok(h) => to.push((h, entry.name)),
                Err(e) => {
                    eprintln!("Error: invalid output hash '{}': {e}", entry.hash);
                    return 2;
                }
            }
        }

        match graph.submit_reduction(&from, to) {
            Ok((executable, removed)) => {
                print_step(
                    &format!("submit_reduction({from})"),
                    &executable,
                    &removed,
                );
            }
            Err(e) => {
                eprintln!("Error: submit_reduction({from}) failed: {e}");
                return 1;
            }
        }
    }

    if let Some(value) = graph.query_value(&root_hash) {
        println!("{{\"root_value\": \"{value}\"}}");
    }

    0
}

fn load_reductions(path: &std::path::Path) -> std::io::Result<Vec<ReductionReport>> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn print_step(step: &str, executable: &std::collections::BTreeSet<Hash>, removed: &[Hash]) {
    let report = StepReport {
        step: step.to_string(),
        executable: executable.iter().map(|h| h.to_string()).collect(),
        removed: removed.iter().map(|h| h.to_string()).collect(),
    };
    match serde_json::to_string(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: failed to serialize step report: {e}"),
    }
}
