//! # castcontrol - driving a DLNA renderer's AVTransport service
//!
//! - [`soap`] / [`soap_client`] : SOAP envelopes and their HTTP transport (blocking, `ureq`)
//! - [`avtransport_client`] : `SetAVTransportURI`, `Play`, `Stop`
//! - [`description`] : device description fetch, manufacturer and `controlURL` lookup
//! - [`renderer`] : renderer descriptor, AVTransport revision, cast session
//! - [`transport`] : [`TransportController`], start with metadata fallback and best-effort stop

pub mod avtransport_client;
pub mod description;
pub mod errors;
pub mod renderer;
pub mod soap;
pub mod soap_client;
pub mod transport;

pub use avtransport_client::AvTransportClient;
pub use description::{DeviceDescription, ServiceEndpoint, fetch_device_description, resolve_control_url};
pub use errors::ControlError;
pub use renderer::{
    AvTransportVersion, RendererDescriptor, RendererSession, StreamFormat, stream_scheme,
};
pub use transport::{AvTransport, TransportController};
