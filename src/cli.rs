//! `bake` binary argument parsing and the generic drive-a-`Build` loop.
//!
//! Target names, `-b`/`--bakefile`, `-c`/`--clean`, plus the ambient
//! `-v`/`-j`/`-n`/`-e` flags any CLI build tool carries.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crate::facade::Build;

/// `bake [-b PATH] [-c] [-j N] [-n] [-e] [-v]... [TARGET...]`
#[derive(Parser, Debug)]
#[command(name = "bake", version, about = "Dependency-driven build orchestrator")]
pub struct Args {
    /// Target names to build. Empty selects the `bakery-default` target.
    pub targets: Vec<String>,

    /// Path to the bakefile. Its existence gates running; the modules it
    /// names are compiled into the binary rather than interpreted from it.
    #[arg(short = 'b', long = "bakefile", default_value = "Bakefile.py")]
    pub bakefile: PathBuf,

    /// Remove previously produced outputs instead of building them.
    #[arg(short = 'c', long)]
    pub clean: bool,

    /// Verbose mode (-v, -vv, -vvv, ...).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Maximum number of subprocesses to run concurrently (default: host CPU count).
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Show the computed execution plan (topological levels) without building anything.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Same as --dry-run: print the execution plan as levels, then exit.
    #[arg(short = 'e', long = "show-plan", alias = "explain")]
    pub show_plan: bool,
}

/// Any truthy presence of `BAKERY_DEBUG` raises the log level to debug and
/// turns on recipe-entry tracing (`recipe::recipe` checks the same variable).
pub fn debug_enabled() -> bool {
    std::env::var_os("BAKERY_DEBUG").is_some()
}

/// Initializes the `env_logger` backend at a level derived from `-v` and
/// `BAKERY_DEBUG`.
pub fn init_logging(verbose: u8) {
    let level = if debug_enabled() || verbose >= 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Topologically layers `graph` (name -> direct dependency names) into
/// levels suitable for `-n`/`-e` display: level 0 has no unresolved
/// dependencies, level k's entries depend only on names in levels `<k`.
/// `graph` is expected to already be acyclic (the façade's `build()` checks
/// this before an evaluator ever runs); a cycle here simply stops levelling
/// early rather than looping forever.
pub fn levels(graph: &HashMap<String, HashSet<String>>) -> Vec<Vec<String>> {
    let mut remaining = graph.clone();
    let mut levels = Vec::new();
    while !remaining.is_empty() {
        let mut ready: Vec<String> = remaining
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| !remaining.contains_key(d)))
            .map(|(name, _)| name.clone())
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort();
        for name in &ready {
            remaining.remove(name);
        }
        levels.push(ready);
    }
    levels
}

fn print_plan(build: &Build, targets: &[String]) -> anyhow::Result<()> {
    let resolved = build.resolve_targets(targets)?;
    let graph = build.dependency_graph(&resolved)?;
    for (i, level) in levels(&graph).into_iter().enumerate() {
        println!("Level {i}: {}", level.join(", "));
    }
    Ok(())
}

/// Drives an already-populated [`Build`] through one CLI invocation: prints
/// the execution plan for `-n`/`-e`, otherwise resolves `args.clean`/targets
/// and reports `BUILD SUCCEEDED`/`BUILD FAILED`. Returns the process exit
/// code: 0 on success, 1 on a missing bakefile or a build failure.
pub async fn run(args: Args, mut build: Build) -> ExitCode {
    if !args.bakefile.exists() {
        eprintln!("Bakefile not found: {}", args.bakefile.display());
        return ExitCode::from(1);
    }

    if args.dry_run || args.show_plan {
        if let Err(err) = print_plan(&build, &args.targets) {
            eprintln!("Failed to compute execution plan: {err}");
            return ExitCode::from(1);
        }
        return ExitCode::SUCCESS;
    }

    match build.build(&args.targets, args.clean).await {
        Ok(_) => {
            println!("BUILD SUCCEEDED");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            if debug_enabled() {
                eprintln!("{err:?}");
            }
            eprintln!("BUILD FAILED");
            ExitCode::from(1)
        }
    }
}
