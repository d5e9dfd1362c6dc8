//! Renderer identity and the session the caster drives on it.

use std::fmt;

use crate::description::DeviceDescription;
use crate::errors::ControlError;

pub const AVTRANSPORT_V1: &str = "urn:schemas-upnp-org:service:AVTransport:1";
pub const AVTRANSPORT_V2: &str = "urn:schemas-upnp-org:service:AVTransport:2";

pub const HTTP_SCHEME: &str = "http";
pub const SONOS_RADIO_SCHEME: &str = "x-rincon-mp3radio";

/// AVTransport revision advertised by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvTransportVersion {
    V1,
    V2,
}

impl AvTransportVersion {
    /// Selects the revision from the tail of a service identifier (usually
    /// the USN), `None` when it names no AVTransport service.
    pub fn from_service_id(service_id: &str) -> Option<Self> {
        let service_id = service_id.trim();
        if service_id.ends_with("AVTransport:1") {
            Some(AvTransportVersion::V1)
        } else if service_id.ends_with("AVTransport:2") {
            Some(AvTransportVersion::V2)
        } else {
            None
        }
    }

    pub fn service_type(&self) -> &'static str {
        match self {
            AvTransportVersion::V1 => AVTRANSPORT_V1,
            AvTransportVersion::V2 => AVTRANSPORT_V2,
        }
    }
}

impl fmt::Display for AvTransportVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_type())
    }
}

/// What discovery hands over about the target renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererDescriptor {
    /// URL of the device description document
    pub location: String,
    /// Service identifier, e.g. `uuid:...::urn:schemas-upnp-org:service:AVTransport:1`
    pub service_id: String,
}

impl RendererDescriptor {
    pub fn new(location: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            service_id: service_id.into(),
        }
    }

    pub fn transport_version(&self) -> Result<AvTransportVersion, ControlError> {
        AvTransportVersion::from_service_id(&self.service_id)
            .ok_or_else(|| ControlError::NoCompatibleService(self.service_id.clone()))
    }
}

/// URL scheme under which the renderer must fetch the stream.
pub fn stream_scheme(description: &DeviceDescription) -> &'static str {
    if description.is_sonos() {
        SONOS_RADIO_SCHEME
    } else {
        HTTP_SCHEME
    }
}

/// Wire format of the stream, as announced in the DIDL-Lite metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    pub mime: String,
    pub content_features: String,
    pub bit_depth: u16,
    pub sample_rate: u32,
    pub channels: u16,
}

/// One cast: a renderer and the URLs it is told to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererSession {
    pub descriptor: RendererDescriptor,
    pub stream_url: String,
    pub cover_url: String,
}

impl RendererSession {
    pub fn new(
        descriptor: RendererDescriptor,
        stream_url: impl Into<String>,
        cover_url: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            stream_url: stream_url.into(),
            cover_url: cover_url.into(),
        }
    }

    /// Single-line DIDL-Lite for `SetAVTransportURI`.
    pub fn metadata(&self, format: &StreamFormat) -> Result<String, castdidl::DidlError> {
        castdidl::stream_metadata(&castdidl::StreamResource {
            cover_uri: &self.cover_url,
            mime: &format.mime,
            content_features: &format.content_features,
            bit_depth: format.bit_depth,
            sample_rate: format.sample_rate,
            channels: format.channels,
            stream_uri: &self.stream_url,
        })
    }
}
