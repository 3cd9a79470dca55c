//! Subcommand implementations.

pub mod daemon;
pub mod echo;
pub mod logusage;
pub mod version;
