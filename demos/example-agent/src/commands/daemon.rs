//! `startdaemon`: run the example services until signalled.

use std::{future::Future, path::Path, sync::Arc};

use clap::Args;
use workload_agent_core::{
    CloudProperties, ConfigError, Integration, LoggingGuard, UsageLogger, read_config,
};
use workload_agent_daemon::{Daemon, DaemonError};

use crate::{config::Configuration, services};

#[derive(Debug, Clone, Default, Args)]
pub struct DaemonArgs {
    /// Configuration path for daemon mode
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,
}

/// Read the configuration and apply defaults.
///
/// A read failure is reported to usage metrics with its error code.
///
/// # Errors
/// Returns error if the file cannot be read or parsed.
pub async fn load_configuration(
    path: &Path,
    integration: &Integration,
    cloud_properties: &CloudProperties,
    usage: &UsageLogger,
) -> Result<Configuration, ConfigError> {
    tracing::info!(path = %path.display(), "Reading configuration");
    match read_config::<Configuration>(path).await {
        Ok(mut config) => {
            tracing::info!("Configuration read successfully");
            config.apply_defaults();
            Ok(config)
        }
        Err(e) => {
            tracing::error!(error = %e, "Could not read configuration");
            usage.set_properties(integration, true, cloud_properties);
            usage.error(e.usage_error_code()).await;
            Err(e)
        }
    }
}

/// Register Fast, Slow and, when a channel is configured, the ACS service.
///
/// # Errors
/// Returns error if two services share a name.
pub fn build_daemon(
    config: &Configuration,
    integration: Integration,
    cloud_properties: CloudProperties,
    usage: Arc<UsageLogger>,
) -> Result<Daemon, DaemonError> {
    let mut daemon = Daemon::new(integration, cloud_properties.clone(), usage);
    daemon.register(services::fast(config))?;
    daemon.register(services::slow(config))?;
    if let Some(settings) = config.channel() {
        daemon.register(services::communication(settings, cloud_properties))?;
    }
    Ok(daemon)
}

/// Run the daemon until `shutdown` resolves.
///
/// # Errors
/// Returns error if the configuration cannot be loaded or the daemon fails.
pub async fn run<F>(
    config_path: &Path,
    integration: Integration,
    metadata_properties: CloudProperties,
    usage: Arc<UsageLogger>,
    logging: &LoggingGuard,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let config =
        load_configuration(config_path, &integration, &metadata_properties, &usage).await?;
    logging.set_level(config.log_level.to_tracing())?;

    let cloud_properties = config
        .cloud_properties
        .clone()
        .filter(|cp| !cp.project_id.is_empty())
        .unwrap_or(metadata_properties);
    build_daemon(&config, integration, cloud_properties, usage)?
        .run(shutdown)
        .await?;
    Ok(())
}
