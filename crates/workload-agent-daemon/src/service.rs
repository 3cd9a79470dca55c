//! Services run by the daemon.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Unit of work a service executes. Receives the daemon's cancellation token.
pub type Work = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

/// How a service spends its lifetime.
#[derive(Clone)]
pub enum ServiceKind {
    /// Wait `interval`, run `work`, repeat until cancelled.
    Periodic { interval: Duration, work: Work },
    /// Run `work` once; it is expected to loop until cancelled.
    Routine(Work),
}

impl fmt::Debug for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Periodic { interval, .. } => f
                .debug_struct("Periodic")
                .field("interval", interval)
                .finish_non_exhaustive(),
            Self::Routine(_) => f.write_str("Routine"),
        }
    }
}

/// A named service with its usage error code.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    /// Usage ERROR code reported when the service fails.
    pub error_code: i32,
    /// Returning earlier than this counts as a failure. Zero disables the check.
    pub expected_min_duration: Duration,
    pub kind: ServiceKind,
}

impl Service {
    /// A service running `work` every `interval`.
    pub fn periodic<F, Fut>(
        name: impl Into<String>,
        error_code: i32,
        interval: Duration,
        work: F,
    ) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            error_code,
            expected_min_duration: Duration::ZERO,
            kind: ServiceKind::Periodic {
                interval,
                work: boxed(work),
            },
        }
    }

    /// A long-running service.
    pub fn routine<F, Fut>(name: impl Into<String>, error_code: i32, work: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            error_code,
            expected_min_duration: Duration::ZERO,
            kind: ServiceKind::Routine(boxed(work)),
        }
    }

    #[must_use]
    pub const fn with_expected_min_duration(mut self, duration: Duration) -> Self {
        self.expected_min_duration = duration;
        self
    }

    /// Run the service once, until it returns or `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        match &self.kind {
            ServiceKind::Routine(work) => work(cancel).await,
            ServiceKind::Periodic { interval, work } => loop {
                tracing::debug!(service = %self.name, wait = ?interval, "Service waiting");
                tokio::select! {
                    () = tokio::time::sleep(*interval) => work(cancel.clone()).await,
                    () = cancel.cancelled() => {
                        tracing::info!(service = %self.name, "Stopped service");
                        return;
                    }
                }
            },
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn boxed<F, Fut>(work: F) -> Work
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |cancel| Box::pin(work(cancel)))
}
