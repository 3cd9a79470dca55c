//! Restart-on-panic supervision for services.
//!
//! A panicking service is reported as a usage ERROR with its code and started
//! again after a backoff. A service that returns by itself is not restarted;
//! if it returned sooner than its expected minimum duration the error code is
//! reported as well.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use workload_agent_communication::{Backoff, ExponentialBackoff};
use workload_agent_core::UsageLogger;

use crate::service::Service;

/// How a single run of a supervised service ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancelled by the daemon.
    Cancelled,
    /// Returned on its own after `ran` elapsed.
    Returned { ran: Duration },
    /// Panicked with the given message.
    Panicked(String),
}

/// Runs a [`Service`] in its own task and restarts it when it panics.
pub struct RecoverableRoutine<B = ExponentialBackoff> {
    service: Service,
    usage: Arc<UsageLogger>,
    backoff: B,
}

impl RecoverableRoutine {
    #[must_use]
    pub fn new(service: Service, usage: Arc<UsageLogger>) -> Self {
        Self::with_backoff(service, usage, ExponentialBackoff::default())
    }
}

impl<B: Backoff + 'static> RecoverableRoutine<B> {
    #[must_use]
    pub const fn with_backoff(service: Service, usage: Arc<UsageLogger>, backoff: B) -> Self {
        Self {
            service,
            usage,
            backoff,
        }
    }

    /// Spawn the supervising task.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.supervise(cancel))
    }

    async fn supervise(mut self, cancel: CancellationToken) {
        loop {
            match run_once(&self.service, &cancel).await {
                RunOutcome::Cancelled => return,
                RunOutcome::Returned { ran } => {
                    if ran < self.service.expected_min_duration {
                        tracing::error!(
                            service = %self.service,
                            ran = ?ran,
                            expected = ?self.service.expected_min_duration,
                            "Service returned before its expected minimum duration"
                        );
                        self.usage.error(self.service.error_code).await;
                    } else {
                        tracing::info!(service = %self.service, "Service finished");
                    }
                    return;
                }
                RunOutcome::Panicked(message) => {
                    let delay = self.backoff.next_backoff();
                    tracing::error!(
                        service = %self.service,
                        panic = %message,
                        restart_in = ?delay,
                        "Service panicked, restarting"
                    );
                    self.usage.error(self.service.error_code).await;
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => return,
                    }
                }
            }
        }
    }
}

/// Run `service` once, catching a panic.
async fn run_once(service: &Service, cancel: &CancellationToken) -> RunOutcome {
    if cancel.is_cancelled() {
        return RunOutcome::Cancelled;
    }
    tracing::debug!(%service, "Starting service routine");
    let started = Instant::now();
    let result = AssertUnwindSafe(service.run(cancel.clone()))
        .catch_unwind()
        .await;
    match result {
        Err(payload) => RunOutcome::Panicked(panic_message(payload.as_ref())),
        Ok(()) if cancel.is_cancelled() => RunOutcome::Cancelled,
        Ok(()) => RunOutcome::Returned {
            ran: started.elapsed(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
