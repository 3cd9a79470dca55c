//! Daemon lifecycle: start services, wait for shutdown, stop.

use std::{future::Future, sync::Arc, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use workload_agent_core::{CloudProperties, Integration, UsageLogger};

use crate::{recovery::RecoverableRoutine, service::Service};

/// Time services get to stop after cancellation.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Daemon error.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("No services registered")]
    NoServices,
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),
}

/// Runs a fixed set of services until shut down.
pub struct Daemon {
    integration: Integration,
    cloud_properties: CloudProperties,
    usage: Arc<UsageLogger>,
    services: Vec<Service>,
    grace_period: Duration,
}

impl Daemon {
    #[must_use]
    pub fn new(
        integration: Integration,
        cloud_properties: CloudProperties,
        usage: Arc<UsageLogger>,
    ) -> Self {
        Self {
            integration,
            cloud_properties,
            usage,
            services: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Register a service.
    ///
    /// # Errors
    /// Returns error if a service with the same name is already registered.
    pub fn register(&mut self, service: Service) -> Result<(), DaemonError> {
        if self.services.iter().any(|s| s.name == service.name) {
            return Err(DaemonError::DuplicateService(service.name));
        }
        self.services.push(service);
        Ok(())
    }

    /// Names of the registered services, in start order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|s| s.name.as_str())
    }

    /// Start every service, wait for `shutdown`, then stop them.
    ///
    /// STARTED is reported once services are about to start and STOPPED once
    /// shutdown begins. Services still running after the grace period are
    /// aborted.
    ///
    /// # Errors
    /// Returns error if no services are registered.
    pub async fn run<F>(self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        if self.services.is_empty() {
            return Err(DaemonError::NoServices);
        }

        let cp = &self.cloud_properties;
        tracing::info!(version = %self.integration.agent_version, "Agent version currently running");
        tracing::info!(
            project_id = %cp.project_id,
            project_number = %cp.numeric_project_id,
            instance_id = %cp.instance_id,
            zone = %cp.zone,
            instance_name = %cp.instance_name,
            image = %cp.image,
            "Cloud properties from metadata server"
        );

        self.usage.set_properties(&self.integration, true, cp);
        self.usage.started().await;
        tracing::info!("Daemon started");

        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(self.services.len() + 1);
        for service in self.services {
            tracing::info!(service = %service, "Daemon starting service");
            tasks.push(RecoverableRoutine::new(service, Arc::clone(&self.usage)).start(cancel.clone()));
        }
        if let Some(task) = self.usage.log_running_daily(cancel.clone()) {
            tasks.push(task);
        }

        shutdown.await;
        tracing::info!("Shutdown signal observed, the agent will begin shutting down");
        cancel.cancel();
        self.usage.stopped().await;

        let wait = futures::future::join_all(tasks.iter_mut());
        if tokio::time::timeout(self.grace_period, wait).await.is_err() {
            tracing::warn!(grace_period = ?self.grace_period, "Services did not stop within the grace period");
            for task in &tasks {
                task.abort();
            }
        }
        tracing::info!("Shutting down...");
        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM (Ctrl-C on other platforms).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use workload_agent_core::{
        UsageReporter,
        usage::{UsageError, UsageRequest},
    };

    use super::*;

    #[derive(Default)]
    struct RecordingReporter {
        user_agents: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UsageReporter for RecordingReporter {
        async fn report(&self, request: &UsageRequest) -> Result<(), UsageError> {
            self.user_agents
                .lock()
                .unwrap()
                .push(request.user_agent.clone());
            Ok(())
        }
    }

    fn daemon() -> (Daemon, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let usage = Arc::new(UsageLogger::new(reporter.clone(), &[]));
        let integration = Integration {
            agent_name: "exampleagent".to_string(),
            agent_version: "1.0".to_string(),
            ..Integration::default()
        };
        let cloud = CloudProperties {
            project_id: "test-project".to_string(),
            zone: "us-central1-a".to_string(),
            instance_name: "test-instance".to_string(),
            ..CloudProperties::default()
        };
        (Daemon::new(integration, cloud, usage), reporter)
    }

    fn counting(name: &str, interval: u64, counter: &Arc<AtomicUsize>) -> Service {
        let counter = Arc::clone(counter);
        Service::periodic(name, 51, Duration::from_secs(interval), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_lifecycle_and_runs_services() {
        let (mut daemon, reporter) = daemon();
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));
        daemon.register(counting("Fast Service", 5, &fast)).unwrap();
        daemon.register(counting("Slow Service", 30, &slow)).unwrap();

        daemon
            .run(tokio::time::sleep(Duration::from_secs(61)))
            .await
            .unwrap();

        assert_eq!(fast.load(Ordering::SeqCst), 12);
        assert_eq!(slow.load(Ordering::SeqCst), 2);
        assert_eq!(
            *reporter.user_agents.lock().unwrap(),
            vec![
                "gwap/exampleagent/1.0/STARTED",
                "gwap/exampleagent/1.0/RUNNING",
                "gwap/exampleagent/1.0/STOPPED",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_services_stop_on_shutdown() {
        let (mut daemon, _) = daemon();
        let stopped = Arc::new(AtomicUsize::new(0));
        {
            let stopped = Arc::clone(&stopped);
            daemon
                .register(Service::routine("Listener", 53, move |cancel: CancellationToken| {
                    let stopped = Arc::clone(&stopped);
                    async move {
                        cancel.cancelled().await;
                        stopped.fetch_add(1, Ordering::SeqCst);
                    }
                }))
                .unwrap();
        }

        let start = tokio::time::Instant::now();
        daemon
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_service_is_aborted_after_grace_period() {
        let (daemon, _) = daemon();
        let mut daemon = daemon.with_grace_period(Duration::from_secs(1));
        daemon
            .register(Service::routine("Stuck", 53, |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }))
            .unwrap();

        let start = tokio::time::Instant::now();
        daemon
            .run(tokio::time::sleep(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_without_services() {
        let (daemon, reporter) = daemon();
        let result = daemon.run(std::future::ready(())).await;
        assert!(matches!(result, Err(DaemonError::NoServices)));
        assert!(reporter.user_agents.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let (mut daemon, _) = daemon();
        let counter = Arc::new(AtomicUsize::new(0));
        daemon.register(counting("Fast Service", 5, &counter)).unwrap();
        let result = daemon.register(counting("Fast Service", 5, &counter));
        assert!(matches!(result, Err(DaemonError::DuplicateService(name)) if name == "Fast Service"));
        assert_eq!(daemon.service_names().collect::<Vec<_>>(), vec!["Fast Service"]);
    }
}
