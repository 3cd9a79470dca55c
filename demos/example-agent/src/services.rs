//! Services run by the example agent daemon.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use workload_agent_communication::{EchoHandler, TcpTransport, communicate};
use workload_agent_core::CloudProperties;
use workload_agent_daemon::Service;

use crate::{
    config::{CommunicationConfig, Configuration},
    usage_codes,
};

/// Broker used when the configuration leaves the endpoint empty.
pub const DEFAULT_ACS_ENDPOINT: &str = "localhost:8950";

pub const FAST_SERVICE: &str = "Fast Service";
pub const SLOW_SERVICE: &str = "Slow Service";
pub const COMMUNICATION_SERVICE: &str = "ACS Communication Service";

pub fn fast(config: &Configuration) -> Service {
    Service::periodic(
        FAST_SERVICE,
        usage_codes::EXAMPLE_FAST_SERVICE_ERROR,
        config.fast_interval(),
        |_| async {
            tracing::info!("Fast Service Processing");
        },
    )
}

pub fn slow(config: &Configuration) -> Service {
    Service::periodic(
        SLOW_SERVICE,
        usage_codes::EXAMPLE_SLOW_SERVICE_ERROR,
        config.slow_interval(),
        |_| async {
            tracing::info!("Slow Service Processing");
        },
    )
}

/// Answers every ACS message on the configured channel with its own body.
pub fn communication(settings: &CommunicationConfig, cloud_properties: CloudProperties) -> Service {
    let endpoint: Arc<str> = settings.endpoint.as_str().into();
    let channel: Arc<str> = settings.channel.as_str().into();
    let cloud_properties = Arc::new(cloud_properties);

    Service::routine(
        COMMUNICATION_SERVICE,
        usage_codes::EXAMPLE_COMMUNICATION_ERROR,
        move |cancel: CancellationToken| {
            let endpoint = Arc::clone(&endpoint);
            let channel = Arc::clone(&channel);
            let cloud_properties = Arc::clone(&cloud_properties);
            async move {
                tracing::info!(%channel, "Starting ACS communication");
                let transport = TcpTransport::new(DEFAULT_ACS_ENDPOINT);
                match communicate(
                    transport,
                    &cancel,
                    &endpoint,
                    &channel,
                    &EchoHandler,
                    &cloud_properties,
                )
                .await
                {
                    Ok(()) => tracing::info!(%channel, "Stopped ACS communication"),
                    Err(e) => {
                        tracing::warn!(%channel, last_error = %e, "Stopped ACS communication");
                    }
                }
            }
        },
    )
}
