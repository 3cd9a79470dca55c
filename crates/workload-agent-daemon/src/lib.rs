//! Daemon skeleton for workload agents.
//!
//! Provides:
//! - `Service` / `ServiceKind` - Periodic and long-running services
//! - `RecoverableRoutine` - Restart-on-panic supervision with usage reporting
//! - `Daemon` - Lifecycle: start services, wait for shutdown, stop

pub mod daemon;
pub mod recovery;
pub mod service;

pub use daemon::{DEFAULT_GRACE_PERIOD, Daemon, DaemonError, shutdown_signal};
pub use recovery::{RecoverableRoutine, RunOutcome};
pub use service::{Service, ServiceKind, Work};
