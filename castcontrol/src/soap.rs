//! SOAP envelopes for UPnP control requests

use std::io::BufReader;

use xmltree::{Element, EmitterConfig, XMLNode};

use crate::errors::ControlError;

const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Parsed SOAP envelope; only the body matters for control responses.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    pub body: Element,
}

/// `<UPnPError>` carried in the detail of a SOAP fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpError {
    pub error_code: u32,
    pub error_description: String,
}

/// Builds the envelope for `action` of service `service_urn`.
///
/// Argument values are escaped by the emitter, so a DIDL-Lite document can be
/// passed as is.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, ControlError> {
    let mut request_elem = Element::new(&format!("u:{}", action));
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        if !value.is_empty() {
            child.children.push(XMLNode::Text((*value).to_string()));
        }
        request_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(request_elem));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(false);
    envelope
        .write_with_config(&mut buf, config)
        .map_err(|e| ControlError::SoapBuild(action.to_string(), e.to_string()))?;

    String::from_utf8(buf).map_err(|e| ControlError::SoapBuild(action.to_string(), e.to_string()))
}

pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, ControlError> {
    let root = Element::parse(BufReader::new(xml)).map_err(ControlError::xml)?;

    if !root.name.ends_with("Envelope") {
        return Err(ControlError::Xml(format!(
            "expected SOAP Envelope, found {}",
            root.name
        )));
    }

    let body = find_child_with_suffix(&root, "Body")
        .ok_or_else(|| ControlError::Xml("missing SOAP Body".to_string()))?;

    Ok(SoapEnvelope { body: body.clone() })
}

/// Extracts `Fault/detail/UPnPError` from a response body, if any.
pub fn parse_upnp_error(envelope: &SoapEnvelope) -> Option<UpnpError> {
    let fault = find_child_with_suffix(&envelope.body, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    let error_code = find_child_with_suffix(upnp_error, "errorCode")?
        .get_text()?
        .trim()
        .parse::<u32>()
        .ok()?;

    let error_description = find_child_with_suffix(upnp_error, "errorDescription")
        .and_then(|elem| elem.get_text())
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Some(UpnpError {
        error_code,
        error_description,
    })
}

pub(crate) fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}
