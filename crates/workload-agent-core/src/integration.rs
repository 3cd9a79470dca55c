//! Agent identity and cloud instance properties.

use serde::{Deserialize, Serialize};

/// Static identity of an agent integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    /// Short integration name, e.g. `example`.
    pub integration_name: String,
    /// Agent name used for log files and usage metrics.
    pub agent_name: String,
    /// Name of the installed binary.
    pub agent_binary_name: String,
    /// Human readable agent name.
    pub agent_long_name: String,
    /// Agent version string.
    pub agent_version: String,
}

/// Properties of the compute instance the agent runs on.
///
/// Populated from the metadata server at startup and passed unchanged to
/// message handlers and usage metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudProperties {
    /// Project id, e.g. `my-project`.
    pub project_id: String,
    /// Project number; matched against the usage exclusion list.
    pub numeric_project_id: String,
    /// Numeric instance id.
    pub instance_id: String,
    /// Zone name, e.g. `us-central1-a`.
    pub zone: String,
    /// Instance name; also the job name on Cloud Run.
    pub instance_name: String,
    /// Boot image path.
    pub image: String,
    /// Machine type, e.g. `n2-standard-4`.
    pub machine_type: String,
    /// Region, derived from the zone.
    pub region: String,
}

impl CloudProperties {
    /// Region derived from a zone name (`us-central1-a` -> `us-central1`).
    #[must_use]
    pub fn region_from_zone(zone: &str) -> String {
        match zone.rsplit_once('-') {
            Some((region, _)) => region.to_string(),
            None => String::new(),
        }
    }
}
