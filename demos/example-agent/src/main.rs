//! Google Cloud Example Agent.
//!
//! Run with: cargo run -p example-agent -- startdaemon -c configuration.json

mod cli;
mod commands;
mod config;
mod services;
mod usage_codes;

#[cfg(test)]
mod testing;

use std::{io, path::PathBuf, sync::Arc};

use clap::Parser;
use tracing::Level;
use workload_agent_core::{
    CloudProperties, Integration, LogParameters, MetadataClient, UsageLogger,
    logging::{self, level_from_str, ote_file_path},
    usage::HttpUsageReporter,
};

use crate::cli::{Cli, Command};

/// Identity of this agent.
pub fn integration() -> Integration {
    Integration {
        integration_name: "example".to_string(),
        agent_name: "google-cloud-example-agent".to_string(),
        agent_binary_name: "google_cloud_example_agent".to_string(),
        agent_long_name: "Google Cloud Example Agent".to_string(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let integration = integration();

    if matches!(cli.command, Command::Version) {
        commands::version::run(&integration, &mut io::stdout())?;
        return Ok(());
    }

    let os_type = std::env::consts::OS;
    let requested_level = level_from_str(&cli.logging.log_level);
    let params = match &cli.command {
        // The daemon's level comes from its configuration once read.
        Command::StartDaemon(_) => LogParameters {
            os_type: os_type.to_string(),
            log_file_name: Some(ote_file_path(&integration.agent_name, "", os_type, "")),
            ..LogParameters::default()
        },
        command => LogParameters {
            os_type: os_type.to_string(),
            level: requested_level.unwrap_or(Level::INFO),
            log_file_name: Some(cli.logging.log_file.clone().unwrap_or_else(|| {
                ote_file_path(&integration.agent_name, command.name(), os_type, "")
            })),
        },
    };
    let log_guard = logging::init(&params)?;
    if let Some(path) = log_guard.log_file() {
        tracing::debug!(path = %path.display(), "Writing logs to file");
    }
    if requested_level.is_none() && !matches!(cli.command, Command::StartDaemon(_)) {
        tracing::warn!(level = %cli.logging.log_level, "Unsupported log level, defaulting to info");
    }

    let cloud_properties = match MetadataClient::default().fetch_cloud_properties().await {
        Ok(properties) => properties,
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch cloud properties from the metadata server");
            CloudProperties::default()
        }
    };
    let usage = Arc::new(UsageLogger::new(Arc::new(HttpUsageReporter::default()), &[]));

    let result: anyhow::Result<()> = match cli.command {
        Command::Version => Ok(()),
        Command::Echo(args) => {
            commands::echo::run(&args, &integration, &cloud_properties, &usage, &mut io::stdout())
                .await
                .map_err(Into::into)
        }
        Command::LogUsage(args) => commands::logusage::run(
            &args,
            &integration.agent_name,
            &integration.agent_version,
            &cloud_properties,
            &usage,
        )
        .await
        .map_err(Into::into),
        Command::StartDaemon(args) => {
            let path = args
                .config
                .unwrap_or_else(|| config::default_config_path(os_type));
            run_daemon(path, integration, cloud_properties, usage, &log_guard).await
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

async fn run_daemon(
    path: PathBuf,
    integration: Integration,
    cloud_properties: CloudProperties,
    usage: Arc<UsageLogger>,
    logging: &logging::LoggingGuard,
) -> anyhow::Result<()> {
    commands::daemon::run(
        &path,
        integration,
        cloud_properties,
        usage,
        logging,
        workload_agent_daemon::shutdown_signal(),
    )
    .await
}
