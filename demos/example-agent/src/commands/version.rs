use std::io::{self, Write};

use workload_agent_core::Integration;

/// Print `<long name> version <version>`.
pub fn run(integration: &Integration, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{} version {}",
        integration.agent_long_name, integration.agent_version
    )
}
