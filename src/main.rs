use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tempestas::manager::Manager;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,

    States,

    Create {
        #[arg(long)]
        steps: Option<u64>,
    },

    Resume {
        #[arg(long)]
        steps: Option<u64>,
    },

    Trace {
        #[arg(long, default_value_t = 24)]
        ticks: usize,
    },

    Analyze,

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = || Manager::new(&args.sim_dir).context("failed to construct mgr");

    match args.command {
        Command::Init => Manager::init_sim(&args.sim_dir)?,
        Command::States => {
            for state in mgr()?.states() {
                println!("{state}");
            }
        }
        Command::Create { steps } => print_report(&mgr()?.create_run(steps)?),
        Command::Resume { steps } => print_report(&mgr()?.resume_run(steps)?),
        Command::Trace { ticks } => {
            for state in mgr()?.trace(ticks)? {
                println!("{state}");
            }
        }
        Command::Analyze => {
            for result in mgr()?.analyze_sim()? {
                println!(
                    "{}: {:.2}% +/- {:.2}% (expected {:.2}%, deviation {:+.2}%)",
                    result.state,
                    result.simulated.mean,
                    result.simulated.std_dev,
                    result.expected,
                    result.deviation
                );
            }
        }
        Command::Clean => mgr()?.clean_sim()?,
    }

    Ok(())
}

fn print_report(report: &tempestas::FrequencyReport) {
    for (state, percentage) in report.iter() {
        println!("{state}: {percentage:.2}%");
    }
}
