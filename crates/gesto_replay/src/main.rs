//! Gesto replay
//!
//! Replay scripted input traces through Gesto interactions and check what
//! the bound commands did.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod replay;
mod scenario;

use scenario::{InteractionKind, Scenario};

#[derive(Parser)]
#[command(name = "gesto-replay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Replay input traces through Gesto interactions", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and check its expectations
    Run {
        /// Scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        /// Print the command journal
        #[arg(short, long)]
        journal: bool,
    },

    /// Validate scenario files without replaying them
    Check {
        /// Scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },

    /// List the interactions a scenario can use
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run { scenarios, journal } => cmd_run(&scenarios, journal),
        Commands::Check { scenarios } => cmd_check(&scenarios),
        Commands::List => cmd_list(),
    }
}

fn cmd_run(paths: &[PathBuf], print_journal: bool) -> Result<()> {
    let mut failed = 0;

    for path in paths {
        let scenario = Scenario::load(path)?;
        info!(
            "Replaying '{}' ({}, {} steps)",
            scenario.scenario.name,
            scenario.scenario.interaction,
            scenario.steps.len()
        );

        let outcome = replay::run(&scenario)?;
        println!(
            "{}: {} of {} events accepted, started {}, executed {}, cancelled {}, ended in '{}' after {:?}",
            scenario.scenario.name,
            outcome.accepted,
            outcome.events,
            outcome.stats.started,
            outcome.stats.executed,
            outcome.stats.cancelled,
            outcome.state,
            outcome.elapsed
        );
        if print_journal {
            for line in &outcome.journal {
                println!("  | {}", line);
            }
        }
        for error in &outcome.errors {
            println!("  ! {}", error);
        }

        if scenario.expect.is_empty() {
            continue;
        }
        let failures = scenario.expect.verify(&outcome);
        if failures.is_empty() {
            println!("  ok");
        } else {
            failed += 1;
            for failure in &failures {
                println!("  FAILED {}", failure);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} scenarios failed", failed, paths.len());
    }
    Ok(())
}

fn cmd_check(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let scenario = Scenario::load(path)?;
        println!(
            "{}: '{}' uses {} with {} steps ({} events)",
            path.display(),
            scenario.scenario.name,
            scenario.scenario.interaction,
            scenario.steps.len(),
            scenario.event_count()
        );
        if let Some(description) = &scenario.scenario.description {
            println!("  {}", description);
        }
    }
    info!("All scenarios are valid");
    Ok(())
}

fn cmd_list() -> Result<()> {
    println!("Interactions:");
    for kind in InteractionKind::ALL {
        println!("  {:<16} {}", kind.name(), kind.summary());
    }
    println!();
    println!("Steps:");
    println!("  mouse-down, mouse-up, click   button, x, y");
    println!("  mouse-move                    x, y");
    println!("  key-down, key-up              key, ctrl");
    println!("  type                          value");
    println!("  wheel                         dx, dy, ctrl");
    println!("  wait                          ms");
    println!("  undo, redo, run-pending");
    Ok(())
}
