use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slipway_deploy::DeployError;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(
    author,
    version,
    about = "Deploy executable programs to a remote validator cluster"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SLIPWAY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Slipway.toml configuration file.
    ///
    /// If not provided, a Slipway.toml in the current directory is used when
    /// present.
    #[arg(long, alias = "conf", env = "SLIPWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// URL of the cluster's RPC endpoint. Overrides the configuration file.
    #[arg(long, alias = "url", env = "SLIPWAY_CLUSTER_URL")]
    pub cluster_url: Option<String>,

    /// Path to the authority keypair file. Overrides the configuration file.
    #[arg(long, env = "SLIPWAY_KEYPAIR")]
    pub keypair: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy an artifact to a program account.
    Deploy {
        /// Path to the compiled artifact.
        artifact: PathBuf,

        /// Address of the target program account.
        program_id: String,
    },

    /// Extend a program account's data capacity by a number of bytes.
    Extend {
        /// Address of the program account.
        program_id: String,

        /// How many bytes to add.
        bytes: u64,
    },

    /// Show the status of a program account, or list open buffer accounts.
    Status {
        /// Address of the program account to inspect.
        #[arg(required_unless_present = "buffers")]
        program_id: Option<String>,

        /// List the authority's open buffer accounts instead.
        #[arg(long, conflicts_with = "program_id")]
        buffers: bool,
    },

    /// Write a default Slipway.toml to the given directory.
    Init {
        /// Target directory.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Classified exit codes, one per failure kind.
pub fn exit_code(err: &DeployError) -> u8 {
    match err {
        DeployError::Artifact(_) => 2,
        DeployError::Stage(_) => 3,
        DeployError::Extend(_) => 4,
        DeployError::Activation { .. } => 5,
        DeployError::Verification(_) => 6,
        DeployError::VerificationMismatch { .. } => 7,
        DeployError::Cancelled => 130,
    }
}
