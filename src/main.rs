//! Tangle simulator binary.
//!
//! Runs a discrete-event simulation of actors growing a tangle and prints a
//! summary of the resulting ledger.
//!
//! Usage:
//!   tangle-sim                                  # run with ./tangle.toml or defaults
//!   tangle-sim run --config sim.toml --seed 7
//!   tangle-sim run --strategy multi-walker --actors 20 --limit 5000
//!   tangle-sim check-config --config sim.toml

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use tangle_sim::config::{IssueTime, SimConfig, Strategy};
use tangle_sim::sim::{SimReport, Simulation};

/// Tangle (DAG ledger) tip-selection simulator.
#[derive(Parser, Debug)]
#[command(name = "tangle-sim", version, about = "Tangle tip-selection simulator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulation.
    Run {
        /// Config file. Defaults to ./tangle.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed for the shared tip-selection generator.
        #[arg(long)]
        seed: Option<u64>,

        /// Tip-selection strategy.
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,

        /// Number of issuing actors.
        #[arg(long)]
        actors: Option<usize>,

        /// Stop after this many transactions.
        #[arg(long)]
        limit: Option<u64>,

        /// Walk bias toward the heaviest candidate, in [0, 1].
        #[arg(long)]
        alpha: Option<f64>,

        /// Time new transactions are stamped with.
        #[arg(long, value_enum)]
        issue_time: Option<IssueTime>,
    },

    /// Parse and validate a config file.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        // No subcommand → run with whatever config is in the working directory
        None => {
            let config = SimConfig::load_from_dir(Path::new("."))?;
            run(config)
        }

        Some(Command::Run {
            config,
            seed,
            strategy,
            actors,
            limit,
            alpha,
            issue_time,
        }) => {
            let mut config = match config {
                Some(path) => SimConfig::load(&path)?,
                None => SimConfig::load_from_dir(Path::new("."))?,
            };
            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }
            if let Some(strategy) = strategy {
                config.selection.strategy = strategy;
            }
            if let Some(actors) = actors {
                config.simulation.actors = actors;
            }
            if let Some(limit) = limit {
                config.simulation.transaction_limit = limit;
            }
            if let Some(alpha) = alpha {
                config.selection.alpha = alpha;
            }
            if let Some(issue_time) = issue_time {
                config.simulation.issue_time = issue_time;
            }
            config.validate()?;
            run(config)
        }

        Some(Command::CheckConfig { config }) => {
            let parsed = SimConfig::load(&config)?;
            println!(
                "  {} {} ({} actors, {} strategy)",
                "OK".green().bold(),
                config.display(),
                parsed.simulation.actors,
                parsed.selection.selector().name()
            );
            Ok(())
        }
    }
}

fn run(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut sim = Simulation::new(config)?;
    let report = sim.run();
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &SimReport) {
    println!(
        "\n{}",
        "========================================".bright_cyan()
    );
    println!("{}", "          SIMULATION RESULTS".bright_cyan().bold());
    println!(
        "{}\n",
        "========================================".bright_cyan()
    );

    println!("  {:<24}{}", "Strategy", report.strategy.bold());
    println!("  {:<24}{}", "Virtual time", report.end_time);
    println!("  {:<24}{}", "Transactions", report.transactions);
    println!("  {:<24}{}", "Confirmed", report.confirmed);
    println!("  {:<24}{}", "Tips at end", report.tips);
    println!("  {:<24}{:.2}", "Mean tips seen", report.mean_tips_seen);
    match report.mean_confirmation_ms {
        Some(ms) => println!("  {:<24}{:.1} ms", "Mean confirmation", ms),
        None => println!("  {:<24}{}", "Mean confirmation", "n/a".dimmed()),
    }
    if report.attach_failures > 0 {
        println!(
            "  {:<24}{}",
            "Attach failures",
            report.attach_failures.to_string().red().bold()
        );
    }

    if !report.tracked.is_empty() {
        println!("\n  {}", "Tracked transactions".yellow());
        for t in &report.tracked {
            let latency = match t.confirmation_ms {
                Some(ms) => format!("{ms} ms").green().to_string(),
                None => "unconfirmed".dimmed().to_string(),
            };
            println!(
                "    {:<8} issued {:<12} approvers {:<4} {}",
                t.id.to_string(),
                t.issue_time.to_string(),
                t.approvers,
                latency
            );
        }
    }
    println!();
}
