//! Command line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::{daemon::DaemonArgs, echo::EchoArgs, logusage::LogUsageArgs};

#[derive(Parser, Debug)]
#[command(name = "google_cloud_example_agent")]
#[command(about = "Google Cloud Example Agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Logging flags for the one-time commands.
#[derive(Args, Debug, Clone, Default)]
pub struct LoggingArgs {
    /// Set the file path for logging
    #[arg(short = 'f', long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Set the logging level (debug, info, warn, error)
    #[arg(short = 'l', long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print agent version information
    Version,

    /// Prints text to the logs
    Echo(EchoArgs),

    /// Start daemon mode of the agent
    #[command(name = "startdaemon")]
    StartDaemon(DaemonArgs),

    /// Log usage metrics for the agent
    #[command(name = "logusage", hide = true)]
    LogUsage(LogUsageArgs),
}

impl Command {
    /// Name used in one-time log file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Echo(_) => crate::commands::echo::NAME,
            Self::StartDaemon(_) => "startdaemon",
            Self::LogUsage(_) => crate::commands::logusage::NAME,
        }
    }
}
