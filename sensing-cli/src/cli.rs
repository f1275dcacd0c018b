use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "sensing",
    version,
    about = "Run mobile sensing study deployments",
    long_about = None
)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SENSING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a study deployment until Ctrl-C or the duration elapses
    Run {
        /// Study deployment JSON file
        #[arg(short, long)]
        deployment: PathBuf,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the sampling schema presets as JSON
    Presets,
}
