//! `echo`: print text to stdout and to the log.

use std::io::{self, Write};

use clap::Args;
use workload_agent_core::{CloudProperties, Integration, UsageLogger};

use crate::usage_codes::{EXAMPLE_ECHO_FINISHED, EXAMPLE_ECHO_STARTED};

/// Name used for the one-time log file.
pub const NAME: &str = "echo";

#[derive(Debug, Clone, Args)]
pub struct EchoArgs {
    /// Text to print to the logs
    #[arg(long, default_value = "")]
    pub text: String,
}

/// Report the start action, print the text, report the finish action.
///
/// Without text only the start action is reported.
pub async fn run(
    args: &EchoArgs,
    integration: &Integration,
    cloud_properties: &CloudProperties,
    usage: &UsageLogger,
    out: &mut impl Write,
) -> io::Result<()> {
    usage.set_properties(integration, true, cloud_properties);
    usage.action(EXAMPLE_ECHO_STARTED).await;

    if args.text.is_empty() {
        return Ok(());
    }

    writeln!(out, "{}", args.text)?;
    tracing::info!(text = %args.text, "echo");
    usage.action(EXAMPLE_ECHO_FINISHED).await;
    Ok(())
}
