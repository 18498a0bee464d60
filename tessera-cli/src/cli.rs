//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tessera_core::config::CONFIG_ENV_VAR;
use tessera_core::{BuildManifest, BuildTarget, ConfigError};

/// Compile, deploy and test staged ledger schemas
#[derive(Parser, Debug)]
#[command(name = "tessera", version)]
#[command(about = "Compile, deploy and test staged ledger schemas")]
pub struct Cli {
    /// Run configuration (TOML)
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Root of the source tree (where build.json lives)
    #[arg(long, global = true, default_value = ".")]
    pub source: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assemble a build target into one artifact file
    Compile {
        #[command(flatten)]
        target: TargetArgs,

        /// Where to write the artifact
        #[arg(long, short = 'o')]
        output: PathBuf,
    },

    /// Deploy a build target into a named database
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Database name inside the configured network
        #[arg(long, short = 'd')]
        database: String,
    },

    /// Run every stage's scenarios against fresh databases
    Test {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List build targets
    Targets,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Build target name from build.json
    pub target: String,

    /// Stop after this stage (inclusive)
    #[arg(long)]
    pub through: Option<String>,
}

impl TargetArgs {
    pub fn resolve(&self, manifest: &BuildManifest) -> Result<BuildTarget, ConfigError> {
        let target = manifest.target(&self.target)?;
        match &self.through {
            Some(stage) => target.through(stage),
            None => Ok(target),
        }
    }
}
