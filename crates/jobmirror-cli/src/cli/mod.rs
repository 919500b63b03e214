//! CLI for the jobmirror print-job mirror.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use commands::{load_config, run_completions, run_fetch, run_serve, run_status};

/// Top-level CLI for jobmirror.
#[derive(Debug, Parser)]
#[command(name = "jobmirror")]
#[command(about = "jobmirror: mirror the active print job's file and serve live progress", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Connect to the printer and serve the HTTP API until interrupted.
    Serve {
        /// Config file (default: $XDG_CONFIG_HOME/jobmirror/config.toml).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration (access code masked).
    Status {
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Resolve one file name against the printer and download it into the cache.
    Fetch {
        /// File name as reported by the printer's telemetry.
        name: String,

        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Serve { config } => run_serve(load_config(config.as_deref())?).await?,
            CliCommand::Status { config } => run_status(&load_config(config.as_deref())?)?,
            CliCommand::Fetch { name, config } => run_fetch(load_config(config.as_deref())?, &name).await?,
            CliCommand::Completions { shell } => run_completions(shell),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
