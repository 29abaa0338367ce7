use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    inspect::{self, InspectArgs},
    run::{self, RunArgs},
};
use pipeline::Stages;

mod commands;
mod config;
mod pipeline;

#[derive(Parser, Debug)]
#[command(name = "nusys", about = "Systematic-uncertainty propagation for selected neutrino interactions")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run reweighting, bootstrap and covariance reduction.
    Run(RunArgs),
    /// Run only the continuous-knob reweight stage.
    Reweight(RunArgs),
    /// Run only the discrete-variation bootstrap stage.
    Bootstrap(RunArgs),
    /// Verify a store and summarise its artifacts.
    Inspect(InspectArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => run::run(&args, Stages::ALL),
        Command::Reweight(args) => run::run(
            &args,
            Stages {
                reweight: true,
                bootstrap: false,
            },
        ),
        Command::Bootstrap(args) => run::run(
            &args,
            Stages {
                reweight: false,
                bootstrap: true,
            },
        ),
        Command::Inspect(args) => inspect::run(&args),
    }
}
