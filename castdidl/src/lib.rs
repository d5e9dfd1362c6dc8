//! # castdidl - DIDL-Lite metadata and DLNA content features
//!
//! Builds the control metadata handed to a renderer together with the stream URI
//! (`CurrentURIMetaData` of `SetAVTransportURI`), and the DLNA capability string
//! advertised for the live stream.

mod content_features;

pub use content_features::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DIDL_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
pub const UPNP_NAMESPACE: &str = "urn:schemas-upnp-org:metadata-1-0/upnp/";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
pub const DLNA_NAMESPACE: &str = "urn:schemas-dlna-org:metadata-1-0/";
pub const SEC_NAMESPACE: &str = "http://www.sec.co.kr/";
pub const PV_NAMESPACE: &str = "http://www.pv.com/pvns/";

const STREAM_TITLE: &str = "Audio Cast";
const STREAM_CREATOR: &str = "AudioCast";
const MUSIC_TRACK_CLASS: &str = "object.item.audioItem.musicTrack";

#[derive(Debug, Error)]
pub enum DidlError {
    #[error("DIDL-Lite serialization failed: {0}")]
    Serialize(String),
    #[error("DIDL-Lite parsing failed: {0}")]
    Parse(String),
}

/// Root of a DIDL-Lite document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename = "DIDL-Lite")]
pub struct DIDLLite {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,

    #[serde(rename = "@xmlns:upnp", skip_serializing_if = "Option::is_none")]
    pub xmlns_upnp: Option<String>,

    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<String>,

    #[serde(rename = "@xmlns:dlna", skip_serializing_if = "Option::is_none")]
    pub xmlns_dlna: Option<String>,

    #[serde(rename = "@xmlns:sec", skip_serializing_if = "Option::is_none")]
    pub xmlns_sec: Option<String>,

    #[serde(rename = "@xmlns:pv", skip_serializing_if = "Option::is_none")]
    pub xmlns_pv: Option<String>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

/// An audio object in a DIDL-Lite document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@parentID")]
    pub parent_id: String,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(rename = "upnp:class", alias = "class")]
    pub class: String,

    #[serde(rename = "dc:title", alias = "title")]
    pub title: String,

    #[serde(
        rename = "dc:creator",
        alias = "creator",
        skip_serializing_if = "Option::is_none"
    )]
    pub creator: Option<String>,

    #[serde(
        rename = "upnp:artist",
        alias = "artist",
        skip_serializing_if = "Option::is_none"
    )]
    pub artist: Option<String>,

    #[serde(
        rename = "upnp:albumArtURI",
        alias = "albumArtURI",
        skip_serializing_if = "Option::is_none"
    )]
    pub album_art: Option<String>,

    #[serde(rename = "res", default)]
    pub resources: Vec<Resource>,
}

/// The media resource: the audio stream itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    #[serde(rename = "@protocolInfo")]
    pub protocol_info: String,

    #[serde(rename = "@bitsPerSample", skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<String>,

    #[serde(rename = "@sampleFrequency", skip_serializing_if = "Option::is_none")]
    pub sample_frequency: Option<String>,

    #[serde(rename = "@nrAudioChannels", skip_serializing_if = "Option::is_none")]
    pub nr_audio_channels: Option<String>,

    #[serde(rename = "$text")]
    pub url: String,
}

impl DIDLLite {
    pub fn parse(input: &str) -> Result<Self, DidlError> {
        quick_xml::de::from_str(input).map_err(|e| DidlError::Parse(e.to_string()))
    }

    /// Serializes the document as a single line, safe to pass as one SOAP argument.
    pub fn to_single_line(&self) -> Result<String, DidlError> {
        let xml =
            quick_xml::se::to_string(self).map_err(|e| DidlError::Serialize(e.to_string()))?;
        Ok(collapse_whitespace(&xml))
    }
}

/// Description of the live stream as announced to the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResource<'a> {
    pub cover_uri: &'a str,
    pub mime: &'a str,
    pub content_features: &'a str,
    pub bit_depth: u16,
    pub sample_rate: u32,
    pub channels: u16,
    pub stream_uri: &'a str,
}

impl StreamResource<'_> {
    pub fn protocol_info(&self) -> String {
        format!("http-get:*:{}:{}", self.mime, self.content_features)
    }

    pub fn to_didl(&self) -> DIDLLite {
        let item = Item {
            id: "0".to_string(),
            parent_id: "-1".to_string(),
            restricted: Some("1".to_string()),
            class: MUSIC_TRACK_CLASS.to_string(),
            title: STREAM_TITLE.to_string(),
            creator: Some(STREAM_CREATOR.to_string()),
            artist: Some(STREAM_CREATOR.to_string()),
            album_art: Some(self.cover_uri.to_string()),
            resources: vec![Resource {
                protocol_info: self.protocol_info(),
                bits_per_sample: Some(self.bit_depth.to_string()),
                sample_frequency: Some(self.sample_rate.to_string()),
                nr_audio_channels: Some(self.channels.to_string()),
                url: self.stream_uri.to_string(),
            }],
        };

        DIDLLite {
            xmlns: DIDL_NAMESPACE.to_string(),
            xmlns_upnp: Some(UPNP_NAMESPACE.to_string()),
            xmlns_dc: Some(DC_NAMESPACE.to_string()),
            xmlns_dlna: Some(DLNA_NAMESPACE.to_string()),
            xmlns_sec: Some(SEC_NAMESPACE.to_string()),
            xmlns_pv: Some(PV_NAMESPACE.to_string()),
            items: vec![item],
        }
    }
}

/// Single-line DIDL-Lite metadata for the stream.
pub fn stream_metadata(resource: &StreamResource<'_>) -> Result<String, DidlError> {
    resource.to_didl().to_single_line()
}

fn collapse_whitespace(xml: &str) -> String {
    let mut out = xml.replace(['\r', '\n'], " ");
    while out.contains("> <") {
        out = out.replace("> <", "><");
    }
    out
}
