//! Start and stop of the cast on the renderer.
//!
//! Starting is `SetAVTransportURI`, a settle delay, then `Play`. Some
//! renderers reject the DIDL-Lite metadata, so a failed start is retried
//! once with empty metadata before giving up.

use std::time::Duration;

use tracing::{info, warn};

use crate::avtransport_client::AvTransportClient;
use crate::description::{DeviceDescription, fetch_device_description, resolve_control_url};
use crate::errors::ControlError;
use crate::renderer::{RendererDescriptor, RendererSession, StreamFormat};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The three AVTransport actions the caster uses, on instance 0.
pub trait AvTransport {
    fn set_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlError>;
    fn play(&self) -> Result<(), ControlError>;
    fn stop(&self) -> Result<(), ControlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    WithMetadata,
    WithoutMetadata,
}

/// Drives a renderer's AVTransport service. All calls block.
#[derive(Debug, Clone)]
pub struct TransportController {
    settle_delay: Duration,
    http_timeout: Duration,
}

impl Default for TransportController {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportController {
    pub fn new() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Pause between `SetAVTransportURI` and `Play`.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    pub fn describe(&self, descriptor: &RendererDescriptor) -> Result<DeviceDescription, ControlError> {
        fetch_device_description(&descriptor.location, self.http_timeout)
    }

    /// AVTransport client for the revision named by the descriptor, bound to
    /// the matching `controlURL` of `description`.
    pub fn client_for(
        &self,
        descriptor: &RendererDescriptor,
        description: &DeviceDescription,
    ) -> Result<AvTransportClient, ControlError> {
        let version = descriptor.transport_version()?;
        let service_type = version.service_type();
        let control_url = description.control_url(service_type).ok_or_else(|| {
            ControlError::MissingControlUrl(descriptor.location.clone(), service_type.to_string())
        })?;

        let base = description
            .url_base
            .as_deref()
            .unwrap_or(&descriptor.location);
        let control_url = resolve_control_url(base, control_url);

        info!("Using {} at {}", service_type, control_url);
        Ok(AvTransportClient::new(control_url, service_type.to_string()).with_timeout(self.http_timeout))
    }

    /// Fetches the description, then sets the stream on the renderer and plays it.
    pub fn start(&self, session: &RendererSession, format: &StreamFormat) -> Result<(), ControlError> {
        // Unsupported renderers fail before any network traffic.
        session.descriptor.transport_version()?;
        let description = self.describe(&session.descriptor)?;
        let client = self.client_for(&session.descriptor, &description)?;
        self.set_and_play(&client, session, format)
    }

    /// Set + play with metadata, then once more without it.
    pub fn set_and_play(
        &self,
        transport: &dyn AvTransport,
        session: &RendererSession,
        format: &StreamFormat,
    ) -> Result<(), ControlError> {
        let metadata = session.metadata(format)?;
        let mut attempt = Attempt::WithMetadata;

        loop {
            let result = match attempt {
                Attempt::WithMetadata => self.try_set_and_play(transport, &session.stream_url, &metadata),
                Attempt::WithoutMetadata => self.try_set_and_play(transport, &session.stream_url, ""),
            };

            match (attempt, result) {
                (_, Ok(())) => {
                    info!("Renderer is playing {}", session.stream_url);
                    return Ok(());
                }
                (Attempt::WithMetadata, Err(e)) => {
                    warn!("{}", e);
                    warn!("Trying without metadata");
                    attempt = Attempt::WithoutMetadata;
                }
                (Attempt::WithoutMetadata, Err(e)) => return Err(e),
            }
        }
    }

    fn try_set_and_play(
        &self,
        transport: &dyn AvTransport,
        uri: &str,
        metadata: &str,
    ) -> Result<(), ControlError> {
        transport
            .set_uri(uri, metadata)
            .map_err(|e| ControlError::SetUri(Box::new(e)))?;
        if !self.settle_delay.is_zero() {
            std::thread::sleep(self.settle_delay);
        }
        transport.play().map_err(|e| ControlError::Play(Box::new(e)))
    }

    /// Best-effort Stop; every failure is logged and swallowed.
    pub fn stop(&self, descriptor: &RendererDescriptor) {
        let client = match descriptor
            .transport_version()
            .and_then(|_| self.describe(descriptor))
            .and_then(|description| self.client_for(descriptor, &description))
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot stop renderer: {}", e);
                return;
            }
        };
        self.stop_with(&client);
    }

    pub fn stop_with(&self, transport: &dyn AvTransport) {
        match transport.stop() {
            Ok(()) => info!("Renderer stopped"),
            Err(e) => warn!("Stop failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RendererDescriptor;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        SetUri(String, String),
        Play,
        Stop,
    }

    /// Fails the first `failures` calls to `fail_on`.
    struct MockTransport {
        calls: Mutex<Vec<Call>>,
        fail_on: &'static str,
        failures: Mutex<usize>,
    }

    impl MockTransport {
        fn new(fail_on: &'static str, failures: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
                failures: Mutex::new(failures),
            }
        }

        fn result(&self, action: &str) -> Result<(), ControlError> {
            let mut failures = self.failures.lock().unwrap();
            if action == self.fail_on && *failures > 0 {
                *failures -= 1;
                return Err(ControlError::Upnp(action.to_string(), 714, "Illegal MIME-type".to_string(), 500));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AvTransport for MockTransport {
        fn set_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::SetUri(uri.to_string(), metadata.to_string()));
            self.result("SetAVTransportURI")
        }

        fn play(&self) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(Call::Play);
            self.result("Play")
        }

        fn stop(&self) -> Result<(), ControlError> {
            self.calls.lock().unwrap().push(Call::Stop);
            self.result("Stop")
        }
    }

    fn session() -> RendererSession {
        RendererSession::new(
            RendererDescriptor::new(
                "http://10.0.0.3:1400/xml/device_description.xml",
                "uuid:x::urn:schemas-upnp-org:service:AVTransport:1",
            ),
            "http://10.0.0.2:9000/stream.mp3",
            "http://10.0.0.2:9000/logo.png",
        )
    }

    fn format() -> StreamFormat {
        StreamFormat {
            mime: "audio/mpeg".to_string(),
            content_features: castdidl::ContentFeatures::live("MP3").to_string(),
            bit_depth: 16,
            sample_rate: 44100,
            channels: 2,
        }
    }

    fn controller() -> TransportController {
        TransportController::new().with_settle_delay(Duration::ZERO)
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let mock = MockTransport::new("", 0);
        controller().set_and_play(&mock, &session(), &format()).unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        match &calls[0] {
            Call::SetUri(uri, metadata) => {
                assert_eq!(uri, "http://10.0.0.2:9000/stream.mp3");
                assert!(metadata.starts_with("<DIDL-Lite"));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(calls[1], Call::Play);
    }

    #[test]
    fn test_retry_without_metadata_after_set_failure() {
        let mock = MockTransport::new("SetAVTransportURI", 1);
        controller().set_and_play(&mock, &session(), &format()).unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], Call::SetUri(_, m) if !m.is_empty()));
        assert_eq!(
            calls[1],
            Call::SetUri("http://10.0.0.2:9000/stream.mp3".to_string(), String::new())
        );
        assert_eq!(calls[2], Call::Play);
    }

    #[test]
    fn test_retry_after_play_failure() {
        let mock = MockTransport::new("Play", 1);
        controller().set_and_play(&mock, &session(), &format()).unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[2], Call::SetUri(_, m) if m.is_empty()));
        assert_eq!(calls[3], Call::Play);
    }

    #[test]
    fn test_second_failure_is_propagated() {
        let mock = MockTransport::new("Play", 2);
        let err = controller()
            .set_and_play(&mock, &session(), &format())
            .unwrap_err();
        assert!(matches!(err, ControlError::Play(_)));
        assert!(err.to_string().starts_with("play: "));
        assert_eq!(mock.calls().len(), 4);
    }

    #[test]
    fn test_settle_delay_is_applied() {
        let mock = MockTransport::new("", 0);
        let started = std::time::Instant::now();
        TransportController::new()
            .with_settle_delay(Duration::from_millis(100))
            .set_and_play(&mock, &session(), &format())
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_stop_swallows_errors() {
        let mock = MockTransport::new("Stop", 1);
        controller().stop_with(&mock);
        assert_eq!(mock.calls(), vec![Call::Stop]);
    }

    #[test]
    fn test_start_rejects_unsupported_renderer() {
        let mut session = session();
        session.descriptor.service_id = "urn:schemas-upnp-org:device:MediaRenderer:1".to_string();
        let err = controller().start(&session, &format()).unwrap_err();
        assert!(matches!(err, ControlError::NoCompatibleService(_)));
    }

    #[test]
    fn test_client_for_uses_version_control_url() {
        let description = DeviceDescription::parse_str(
            r#"<root><device><serviceList>
                <service><serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType><controlURL>/v1/ctrl</controlURL></service>
                <service><serviceType>urn:schemas-upnp-org:service:AVTransport:2</serviceType><controlURL>v2/ctrl</controlURL></service>
            </serviceList></device></root>"#,
        )
        .unwrap();

        let v1 = RendererDescriptor::new(
            "http://10.0.0.3:1400/xml/desc.xml",
            "urn:schemas-upnp-org:service:AVTransport:1",
        );
        let client = controller().client_for(&v1, &description).unwrap();
        assert_eq!(client.control_url, "http://10.0.0.3:1400/v1/ctrl");
        assert_eq!(client.service_type, "urn:schemas-upnp-org:service:AVTransport:1");

        let v2 = RendererDescriptor::new(
            "http://10.0.0.3:1400/xml/desc.xml",
            "urn:schemas-upnp-org:service:AVTransport:2",
        );
        let client = controller().client_for(&v2, &description).unwrap();
        assert_eq!(client.control_url, "http://10.0.0.3:1400/xml/v2/ctrl");
    }

    #[test]
    fn test_client_for_missing_service() {
        let description = DeviceDescription::default();
        let descriptor = RendererDescriptor::new(
            "http://10.0.0.3/desc.xml",
            "urn:schemas-upnp-org:service:AVTransport:2",
        );
        assert!(matches!(
            controller().client_for(&descriptor, &description),
            Err(ControlError::MissingControlUrl(_, _))
        ));
    }
}
