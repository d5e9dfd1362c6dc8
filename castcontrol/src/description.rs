//! UPnP device description (`description.xml`) fetch and parse.

use std::io::BufRead;
use std::time::Duration;

use quick_xml::{Reader, escape::resolve_predefined_entity, events::Event};
use tracing::debug;
use ureq::Agent;

use crate::errors::ControlError;

/// A `<service>` entry of the description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service_type: String,
    pub control_url: String,
}

/// The parts of a device description the caster needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub url_base: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    /// Services of the root device and of its embedded devices, in document order
    pub services: Vec<ServiceEndpoint>,
}

impl DeviceDescription {
    /// Parses a description document. Device fields keep the first value
    /// seen, which is the root device's.
    pub fn parse<R: BufRead>(input: R) -> Result<Self, ControlError> {
        // Text is trimmed per element; trimming each event would eat the
        // spaces around entity references.
        let mut reader = Reader::from_reader(input);

        let mut buf = Vec::new();
        let mut parsed = DeviceDescription::default();
        let mut text = String::new();
        let mut in_service = false;
        let mut service_type: Option<String> = None;
        let mut control_url: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf).map_err(ControlError::xml)? {
                Event::Start(e) => {
                    text.clear();
                    if e.local_name().as_ref() == b"service" {
                        in_service = true;
                        service_type = None;
                        control_url = None;
                    }
                }
                Event::Text(e) => {
                    text.push_str(&e.decode().map_err(ControlError::xml)?);
                }
                Event::CData(e) => {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
                Event::GeneralRef(e) => {
                    let name = e.decode().map_err(ControlError::xml)?;
                    if let Some(resolved) = resolve_predefined_entity(&name) {
                        text.push_str(resolved);
                    }
                }
                Event::End(e) => {
                    let value = text.trim().to_string();
                    text.clear();
                    match e.local_name().as_ref() {
                        b"service" => {
                            if let (Some(st), Some(ctrl)) = (service_type.take(), control_url.take())
                            {
                                parsed.services.push(ServiceEndpoint {
                                    service_type: st,
                                    control_url: ctrl,
                                });
                            }
                            in_service = false;
                        }
                        b"serviceType" if in_service => service_type = Some(value),
                        b"controlURL" if in_service => control_url = Some(value),
                        b"URLBase" => set_once(&mut parsed.url_base, value),
                        b"friendlyName" => set_once(&mut parsed.friendly_name, value),
                        b"manufacturer" => set_once(&mut parsed.manufacturer, value),
                        b"modelName" => set_once(&mut parsed.model_name, value),
                        _ => {}
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(parsed)
    }

    pub fn parse_str(xml: &str) -> Result<Self, ControlError> {
        Self::parse(xml.as_bytes())
    }

    /// Sonos players only accept the live stream under their radio scheme.
    pub fn is_sonos(&self) -> bool {
        self.manufacturer
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains("sonos"))
    }

    /// `controlURL` of the service whose type equals `service_type`.
    pub fn control_url(&self, service_type: &str) -> Option<&str> {
        self.services
            .iter()
            .find(|s| s.service_type.eq_ignore_ascii_case(service_type))
            .map(|s| s.control_url.as_str())
    }
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

/// GETs and parses the description at `location`.
pub fn fetch_device_description(
    location: &str,
    timeout: Duration,
) -> Result<DeviceDescription, ControlError> {
    debug!("Fetching device description at {}", location);

    let agent: Agent = Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();

    let mut response = agent.get(location).call()?;
    let body = response.body_mut().read_to_string()?;
    DeviceDescription::parse_str(&body)
}

/// Resolve a possibly relative controlURL against the description URL.
///
/// - Absolute URLs (http:// or https://) are returned as-is.
/// - `/path` is resolved against `scheme://host:port` of `base_url`.
/// - `path` is resolved against the directory of `base_url`.
pub fn resolve_control_url(base_url: &str, control_url: &str) -> String {
    if control_url.starts_with("http://") || control_url.starts_with("https://") {
        return control_url.to_string();
    }

    let Some((scheme, rest)) = base_url.split_once("://") else {
        return control_url.to_string();
    };
    let (authority, path) = match rest.find('/') {
        Some(pos) => rest.split_at(pos),
        None => (rest, "/"),
    };

    if control_url.starts_with('/') {
        format!("{}://{}{}", scheme, authority, control_url)
    } else {
        let dir = path.rfind('/').map_or("/", |i| &path[..=i]);
        format!("{}://{}{}{}", scheme, authority, dir, control_url)
    }
}
