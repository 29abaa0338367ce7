use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::config::RunConfig;
use crate::pipeline::{execute, Stages};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// Override the master seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Override the bootstrap draw count.
    #[arg(long)]
    pub draws: Option<usize>,
    /// Override the worker thread count.
    #[arg(long)]
    pub threads: Option<usize>,
    /// Override the output store path.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn load(&self) -> Result<RunConfig, Box<dyn Error>> {
        let mut config = RunConfig::load(&self.config)?;
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(draws) = self.draws {
            config.draws = Some(draws);
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        Ok(config)
    }
}

pub fn run(args: &RunArgs, stages: Stages) -> Result<(), Box<dyn Error>> {
    let config = args.load()?;
    let file = execute(&config, stages)?;
    file.write(&config.output)?;
    info!(
        output = %config.output.display(),
        hash = %file.content_hash,
        "store written"
    );
    println!("{}", file.content_hash);
    Ok(())
}
