//! Compute metadata server client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::CloudProperties;

/// Default metadata server address.
pub const METADATA_SERVER_URL: &str = "http://metadata.google.internal";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata server error.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Invalid metadata response: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MetadataResponse {
    project: ProjectMetadata,
    instance: InstanceMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectMetadata {
    project_id: String,
    numeric_project_id: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InstanceMetadata {
    id: Value,
    zone: String,
    name: String,
    image: String,
    machine_type: String,
}

/// Client for the compute metadata server.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), METADATA_SERVER_URL)
    }
}

impl MetadataClient {
    /// Create a client against `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch the properties of the instance the agent runs on.
    ///
    /// # Errors
    /// Returns error if the metadata server is unreachable or answers with
    /// unexpected content.
    pub async fn fetch_cloud_properties(&self) -> Result<CloudProperties, MetadataError> {
        let url = format!("{}/computeMetadata/v1/?recursive=true&alt=json", self.base_url);
        tracing::debug!(%url, "Fetching cloud properties from metadata server");
        let body = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_cloud_properties(&body)
    }
}

/// Parse a recursive metadata document into cloud properties.
///
/// # Errors
/// Returns error if `body` is not a JSON object.
pub fn parse_cloud_properties(body: &[u8]) -> Result<CloudProperties, MetadataError> {
    let response: MetadataResponse = serde_json::from_slice(body)?;
    let zone = last_segment(&response.instance.zone);
    Ok(CloudProperties {
        project_id: response.project.project_id,
        numeric_project_id: value_to_string(&response.project.numeric_project_id),
        instance_id: value_to_string(&response.instance.id),
        region: CloudProperties::region_from_zone(&zone),
        zone,
        instance_name: response.instance.name,
        image: response.instance.image,
        machine_type: last_segment(&response.instance.machine_type),
    })
}

fn last_segment(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cloud_properties() {
        let body = br#"{
            "project": {"projectId": "test-project", "numericProjectId": 123456789},
            "instance": {
                "id": 987654321,
                "zone": "projects/123456789/zones/us-central1-a",
                "name": "test-instance",
                "image": "projects/debian-cloud/global/images/debian-12",
                "machineType": "projects/123456789/machineTypes/e2-medium"
            }
        }"#;
        let props = parse_cloud_properties(body).unwrap();
        assert_eq!(props.project_id, "test-project");
        assert_eq!(props.numeric_project_id, "123456789");
        assert_eq!(props.instance_id, "987654321");
        assert_eq!(props.zone, "us-central1-a");
        assert_eq!(props.region, "us-central1");
        assert_eq!(props.instance_name, "test-instance");
        assert_eq!(props.image, "projects/debian-cloud/global/images/debian-12");
        assert_eq!(props.machine_type, "e2-medium");
    }

    #[test]
    fn test_parse_cloud_properties_partial() {
        let props = parse_cloud_properties(br#"{"project": {"projectId": "p"}}"#).unwrap();
        assert_eq!(props.project_id, "p");
        assert!(props.zone.is_empty());
        assert!(props.region.is_empty());
    }

    #[test]
    fn test_parse_cloud_properties_invalid() {
        assert!(matches!(
            parse_cloud_properties(b"<html>"),
            Err(MetadataError::Parse(_))
        ));
    }
}
