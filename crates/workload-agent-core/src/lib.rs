//! Shared building blocks for Google Cloud workload agents.
//!
//! This crate provides:
//! - `Integration` / `CloudProperties` - Agent identity and instance metadata
//! - `read_config` - JSON configuration loading
//! - `logging` - Structured logging bootstrap with a scoped guard
//! - `UsageLogger` - Agent status self-reporting
//! - `MetadataClient` - Compute metadata server lookups

pub mod config;
pub mod integration;
pub mod logging;
pub mod metadata;
pub mod usage;

pub use config::{ConfigError, LogLevel, read_config};
pub use integration::{CloudProperties, Integration};
pub use logging::{LogParameters, LoggingGuard};
pub use metadata::MetadataClient;
pub use usage::{AgentProperties, UsageLogger, UsageReporter, UsageStatus};
