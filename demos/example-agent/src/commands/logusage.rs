//! `logusage`: report a single usage status on behalf of an agent or tool.

use clap::Args;
use thiserror::Error;
use workload_agent_core::{
    AgentProperties, CloudProperties, UsageLogger, UsageStatus,
    usage::LOG_USAGE_PREFIX,
};

pub const NAME: &str = "logusage";

/// Argument validation error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogUsageError {
    #[error("a usage status value is required")]
    MissingStatus,
    #[error("for status UPDATED, Agent Version is required")]
    MissingVersion,
    #[error("for status ERROR, an error code is required")]
    MissingErrorCode,
    #[error("for status ACTION, an action code is required")]
    MissingActionCode,
}

#[derive(Debug, Clone, Default, Args)]
pub struct LogUsageArgs {
    /// Agent or tool name
    #[arg(short, long)]
    pub name: Option<String>,
    /// Agent or tool version
    #[arg(long = "agent-version", alias = "av")]
    pub agent_version: Option<String>,
    /// Usage status value (RUNNING, INSTALLED, ...)
    #[arg(short, long, default_value = "")]
    pub status: String,
    /// Usage action code
    #[arg(short, long, default_value_t = 0)]
    pub action: i32,
    /// Usage error code
    #[arg(short, long, default_value_t = 0)]
    pub error: i32,
    /// Image URL of the compute instance (default from the metadata server)
    #[arg(short, long)]
    pub image: Option<String>,
}

impl LogUsageArgs {
    fn validate(&self, version: &str) -> Result<(), LogUsageError> {
        match self.status.as_str() {
            "" => Err(LogUsageError::MissingStatus),
            "UPDATED" if version.is_empty() => Err(LogUsageError::MissingVersion),
            "ERROR" if self.error <= 0 => Err(LogUsageError::MissingErrorCode),
            "ACTION" if self.action <= 0 => Err(LogUsageError::MissingActionCode),
            _ => Ok(()),
        }
    }
}

/// Validate the arguments and report the status.
///
/// Name and version default to the running agent's. A status that cannot be
/// reported is logged, not returned.
///
/// # Errors
/// Returns error if a required argument is missing.
pub async fn run(
    args: &LogUsageArgs,
    agent_name: &str,
    agent_version: &str,
    cloud_properties: &CloudProperties,
    usage: &UsageLogger,
) -> Result<(), LogUsageError> {
    let name = args.name.as_deref().unwrap_or(agent_name);
    let version = args.agent_version.as_deref().unwrap_or(agent_version);
    args.validate(version).inspect_err(|e| {
        tracing::error!(error = %e, "Invalid logusage arguments");
    })?;

    let mut cloud_properties = cloud_properties.clone();
    if let Some(image) = args.image.as_ref().filter(|i| !i.is_empty()) {
        cloud_properties.image.clone_from(image);
    }
    usage.set_agent_props(AgentProperties {
        name: name.to_string(),
        version: version.to_string(),
        log_usage_metrics: true,
        log_usage_prefix: LOG_USAGE_PREFIX.to_string(),
        log_usage_optional: String::new(),
    });
    usage.set_cloud_props(cloud_properties);

    let status = match args.status.parse::<UsageStatus>() {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "Could not log usage");
            return Ok(());
        }
    };
    let value = match status {
        UsageStatus::Error => args.error.to_string(),
        UsageStatus::Action => args.action.to_string(),
        UsageStatus::Updated => version.to_string(),
        _ => String::new(),
    };
    if let Err(e) = usage.log_status(status, &value).await {
        tracing::warn!(error = %e, "Could not log usage");
    }
    Ok(())
}
