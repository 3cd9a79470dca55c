//! Test doubles shared by the command tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use workload_agent_core::{
    CloudProperties, Integration, UsageLogger, UsageReporter,
    usage::{UsageError, UsageRequest},
};

#[derive(Default)]
pub struct RecordingReporter {
    requests: Mutex<Vec<UsageRequest>>,
}

impl RecordingReporter {
    pub fn user_agents(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.user_agent.clone())
            .collect()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }
}

#[async_trait]
impl UsageReporter for RecordingReporter {
    async fn report(&self, request: &UsageRequest) -> Result<(), UsageError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub fn usage_logger() -> (Arc<UsageLogger>, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    (Arc::new(UsageLogger::new(reporter.clone(), &[])), reporter)
}

pub fn integration() -> Integration {
    crate::integration()
}

pub fn cloud_properties() -> CloudProperties {
    CloudProperties {
        project_id: "test-project".to_string(),
        numeric_project_id: "123456".to_string(),
        instance_id: "987654".to_string(),
        zone: "us-central1-a".to_string(),
        instance_name: "test-instance".to_string(),
        image: "test-image".to_string(),
        region: "us-central1".to_string(),
        ..CloudProperties::default()
    }
}
