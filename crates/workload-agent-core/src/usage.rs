//! Usage metrics: agent status self-reporting.
//!
//! Each status is reported by issuing a request whose `User-Agent` encodes
//! the agent name, version and status against the instance's compute (or
//! Cloud Run) resource URL.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{CloudProperties, Integration};

// Global codes. The first 50 are reserved for the platform, integrations start at 51.
pub const GLOBAL_CONFIG_FILE_READ_ERROR: i32 = 1;
pub const GLOBAL_MALFORMED_CONFIG_FILE_ERROR: i32 = 2;

/// Prefix used by platform agents in the usage user agent.
pub const LOG_USAGE_PREFIX: &str = "gwap";

const COMPUTE_URL: &str = "https://compute.googleapis.com/compute/v1";
const RUN_URL: &str = "https://run.googleapis.com/v1";
const DAILY: Duration = Duration::from_secs(24 * 60 * 60 + 60);

/// Usage metrics error.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Unknown usage status: {0}")]
    UnknownStatus(String),
    #[error("Zone is not set for GCE")]
    MissingZone,
    #[error("Region is not set for Cloud Run")]
    MissingRegion,
    #[error("Usage request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Reported agent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageStatus {
    Running,
    Started,
    Stopped,
    Configured,
    Misconfigured,
    Error,
    Installed,
    Updated,
    Uninstalled,
    Action,
}

impl UsageStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
            Self::Configured => "CONFIGURED",
            Self::Misconfigured => "MISCONFIGURED",
            Self::Error => "ERROR",
            Self::Installed => "INSTALLED",
            Self::Updated => "UPDATED",
            Self::Uninstalled => "UNINSTALLED",
            Self::Action => "ACTION",
        }
    }
}

impl fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageStatus {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RUNNING" => Self::Running,
            "STARTED" => Self::Started,
            "STOPPED" => Self::Stopped,
            "CONFIGURED" => Self::Configured,
            "MISCONFIGURED" => Self::Misconfigured,
            "ERROR" => Self::Error,
            "INSTALLED" => Self::Installed,
            "UPDATED" => Self::Updated,
            "UNINSTALLED" => Self::Uninstalled,
            "ACTION" => Self::Action,
            other => return Err(UsageError::UnknownStatus(other.to_string())),
        })
    }
}

/// Agent properties included in every usage report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentProperties {
    pub name: String,
    pub version: String,
    pub log_usage_metrics: bool,
    pub log_usage_prefix: String,
    /// Extra segment inserted before the status when non-empty.
    pub log_usage_optional: String,
}

/// Compute environment the agent reports from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Platform {
    #[default]
    Gce,
    CloudRun { job_name: String },
}

/// A single usage report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRequest {
    pub url: String,
    pub user_agent: String,
    /// Consumer project, sent as `X-Goog-User-Project`.
    pub project_id: Option<String>,
}

/// Sends usage reports.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    /// Deliver a usage report.
    async fn report(&self, request: &UsageRequest) -> Result<(), UsageError>;
}

/// Reporter issuing GET requests over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpUsageReporter {
    client: reqwest::Client,
}

impl HttpUsageReporter {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// `Metadata-Flavor` is only sent to the compute API.
    fn build(&self, request: &UsageRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(&request.url)
            .header(reqwest::header::USER_AGENT, &request.user_agent);
        if request.url.starts_with(COMPUTE_URL) {
            req = req.header("Metadata-Flavor", "Google");
        }
        if let Some(project) = &request.project_id {
            req = req.header("X-Goog-User-Project", project);
        }
        req
    }
}

#[async_trait]
impl UsageReporter for HttpUsageReporter {
    async fn report(&self, request: &UsageRequest) -> Result<(), UsageError> {
        self.build(request).send().await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Properties {
    agent: Option<AgentProperties>,
    cloud: Option<CloudProperties>,
    platform: Platform,
}

/// Reports the operational status of an agent.
pub struct UsageLogger {
    reporter: Arc<dyn UsageReporter>,
    props: RwLock<Properties>,
    project_exclusions: HashSet<String>,
    last_called: Mutex<HashMap<UsageStatus, SystemTime>>,
    daily_running_started: AtomicBool,
}

impl UsageLogger {
    /// Create a logger. Projects whose number is in `project_exclusions` never report.
    #[must_use]
    pub fn new(reporter: Arc<dyn UsageReporter>, project_exclusions: &[&str]) -> Self {
        Self {
            reporter,
            props: RwLock::new(Properties::default()),
            project_exclusions: project_exclusions.iter().map(ToString::to_string).collect(),
            last_called: Mutex::new(HashMap::new()),
            daily_running_started: AtomicBool::new(false),
        }
    }

    /// Configure the logger for a platform integration.
    pub fn set_properties(&self, integration: &Integration, enabled: bool, cloud: &CloudProperties) {
        self.set_agent_props(AgentProperties {
            name: integration.agent_name.clone(),
            version: integration.agent_version.clone(),
            log_usage_metrics: enabled,
            log_usage_prefix: LOG_USAGE_PREFIX.to_string(),
            log_usage_optional: String::new(),
        });
        self.set_cloud_props(cloud.clone());
    }

    pub fn set_agent_props(&self, agent: AgentProperties) {
        self.props.write().unwrap_or_else(PoisonError::into_inner).agent = Some(agent);
    }

    pub fn set_cloud_props(&self, cloud: CloudProperties) {
        self.props.write().unwrap_or_else(PoisonError::into_inner).cloud = Some(cloud);
    }

    pub fn set_platform(&self, platform: Platform) {
        self.props.write().unwrap_or_else(PoisonError::into_inner).platform = platform;
    }

    /// Report `status` with an optional value (error code, action code or version).
    ///
    /// Does nothing when usage metrics are disabled or the project is excluded.
    ///
    /// # Errors
    /// Returns error if the report cannot be built or delivered.
    pub async fn log_status(&self, status: UsageStatus, value: &str) -> Result<(), UsageError> {
        let (agent, cloud, platform) = {
            let props = self.props.read().unwrap_or_else(PoisonError::into_inner);
            match &props.agent {
                Some(agent) if agent.log_usage_metrics => (
                    agent.clone(),
                    props.cloud.clone().unwrap_or_default(),
                    props.platform.clone(),
                ),
                _ => return Ok(()),
            }
        };

        let message = if value.is_empty() {
            status.to_string()
        } else {
            format!("{status}/{value}")
        };
        tracing::debug!(status = %message, "logging status");

        let result = self.send(&agent, &cloud, &platform, &message).await;
        self.last_called
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(status, SystemTime::now());
        result
    }

    async fn send(
        &self,
        agent: &AgentProperties,
        cloud: &CloudProperties,
        platform: &Platform,
        message: &str,
    ) -> Result<(), UsageError> {
        let url = match platform {
            Platform::Gce if cloud.zone.is_empty() => {
                tracing::warn!("Unable to send GCE agent status without zone in cloud properties");
                return Err(UsageError::MissingZone);
            }
            Platform::CloudRun { .. } if cloud.region.is_empty() => {
                tracing::warn!("Unable to send Cloud Run agent status without region in cloud properties");
                return Err(UsageError::MissingRegion);
            }
            Platform::Gce => build_compute_url(cloud),
            Platform::CloudRun { job_name } => build_run_url(cloud, job_name),
        };
        if self.project_exclusions.contains(&cloud.numeric_project_id) {
            return Ok(());
        }

        let request = UsageRequest {
            url,
            user_agent: build_user_agent(agent, message),
            project_id: Some(cloud.project_id.clone()).filter(|p| !p.is_empty()),
        };
        self.reporter.report(&request).await.inspect_err(|e| {
            tracing::warn!(error = %e, ?platform, "failed to send agent status");
        })
    }

    async fn log_quietly(&self, status: UsageStatus, value: &str) {
        if let Err(e) = self.log_status(status, value).await {
            tracing::debug!(%status, error = %e, "Could not log usage");
        }
    }

    pub async fn running(&self) {
        self.log_quietly(UsageStatus::Running, "").await;
    }

    pub async fn started(&self) {
        self.log_quietly(UsageStatus::Started, "").await;
    }

    pub async fn stopped(&self) {
        self.log_quietly(UsageStatus::Stopped, "").await;
    }

    pub async fn configured(&self) {
        self.log_quietly(UsageStatus::Configured, "").await;
    }

    pub async fn misconfigured(&self) {
        self.log_quietly(UsageStatus::Misconfigured, "").await;
    }

    pub async fn error(&self, id: i32) {
        self.log_quietly(UsageStatus::Error, &id.to_string()).await;
    }

    pub async fn installed(&self) {
        self.log_quietly(UsageStatus::Installed, "").await;
    }

    pub async fn updated(&self, version: &str) {
        self.log_quietly(UsageStatus::Updated, version).await;
    }

    pub async fn uninstalled(&self) {
        self.log_quietly(UsageStatus::Uninstalled, "").await;
    }

    pub async fn action(&self, id: i32) {
        self.log_quietly(UsageStatus::Action, &id.to_string()).await;
    }

    /// Last time `status` was reported, if ever.
    #[must_use]
    pub fn last_called(&self, status: UsageStatus) -> Option<SystemTime> {
        self.last_called
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .copied()
    }

    /// Report RUNNING now and then once a day until `cancel` fires.
    ///
    /// Only the first call starts the task; later calls return `None`.
    pub fn log_running_daily(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if self.daily_running_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Daily log of RUNNING status already started");
            return None;
        }
        tracing::debug!("Starting daily log of RUNNING status");
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                this.running().await;
                tokio::select! {
                    () = tokio::time::sleep(DAILY) => {}
                    () = cancel.cancelled() => return,
                }
            }
        }))
    }
}

/// `prefix/name/version[/optional]/status`, with spaces and newlines removed.
#[must_use]
pub fn build_user_agent(agent: &AgentProperties, status: &str) -> String {
    let mut ua = format!("{}/{}/{}", agent.log_usage_prefix, agent.name, agent.version);
    if !agent.log_usage_optional.is_empty() {
        ua.push('/');
        ua.push_str(&agent.log_usage_optional);
    }
    ua.push('/');
    ua.push_str(status);
    ua.replace([' ', '\n'], "")
}

/// Compute API URL of the instance.
#[must_use]
pub fn build_compute_url(cloud: &CloudProperties) -> String {
    format!(
        "{COMPUTE_URL}/projects/{}/zones/{}/instances/{}",
        cloud.project_id, cloud.zone, cloud.instance_name
    )
}

/// Cloud Run Admin API URL of a job.
#[must_use]
pub fn build_run_url(cloud: &CloudProperties, job_name: &str) -> String {
    format!(
        "{RUN_URL}/projects/{}/locations/{}/jobs/{job_name}",
        cloud.project_id, cloud.region
    )
}
