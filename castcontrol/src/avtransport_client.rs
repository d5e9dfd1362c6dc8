use std::time::Duration;

use crate::errors::ControlError;
use crate::soap_client::{handle_action_response, invoke_upnp_action};
use crate::transport::AvTransport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SOAP client for one renderer's AVTransport service (instance 0).
#[derive(Debug, Clone)]
pub struct AvTransportClient {
    pub control_url: String,
    pub service_type: String,
    timeout: Duration,
}

impl AvTransportClient {
    pub fn new(control_url: String, service_type: String) -> Self {
        Self {
            control_url,
            service_type,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn call(&self, action: &str, args: &[(&str, &str)]) -> Result<(), ControlError> {
        let call_result = invoke_upnp_action(
            &self.control_url,
            &self.service_type,
            action,
            args,
            self.timeout,
        )?;
        handle_action_response(action, &call_result)
    }

    pub fn set_av_transport_uri(
        &self,
        instance_id: u32,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ControlError> {
        let instance_id = instance_id.to_string();
        self.call(
            "SetAVTransportURI",
            &[
                ("InstanceID", instance_id.as_str()),
                ("CurrentURI", uri),
                ("CurrentURIMetaData", metadata),
            ],
        )
    }

    pub fn play(&self, instance_id: u32, speed: &str) -> Result<(), ControlError> {
        let instance_id = instance_id.to_string();
        self.call("Play", &[("InstanceID", instance_id.as_str()), ("Speed", speed)])
    }

    pub fn stop(&self, instance_id: u32) -> Result<(), ControlError> {
        let instance_id = instance_id.to_string();
        self.call("Stop", &[("InstanceID", instance_id.as_str())])
    }
}

impl AvTransport for AvTransportClient {
    fn set_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlError> {
        self.set_av_transport_uri(0, uri, metadata)
    }

    fn play(&self) -> Result<(), ControlError> {
        AvTransportClient::play(self, 0, "1")
    }

    fn stop(&self) -> Result<(), ControlError> {
        AvTransportClient::stop(self, 0)
    }
}
