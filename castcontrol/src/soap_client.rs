use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use crate::errors::ControlError;
use crate::soap::{SoapEnvelope, build_soap_request, parse_soap_envelope, parse_upnp_error};

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
pub struct SoapCallResult {
    pub status: u16,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN, e.g. "urn:schemas-upnp-org:service:AVTransport:1"
/// - `action`: action name, e.g. "SetAVTransportURI"
/// - `args`: list of (name, value) pairs, e.g. &[("InstanceID", "0")]
pub fn invoke_upnp_action(
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
    timeout: Duration,
) -> Result<SoapCallResult, ControlError> {
    let body_xml = build_soap_request(service_type, action, args)?;

    // 4xx/5xx must not become Err: SOAP faults come back as HTTP 500 with a body.
    let agent: Agent = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(timeout))
        .build()
        .into();

    let soap_action_header = format!(r#""{}#{}""#, service_type, action);
    debug!("SOAP {} -> {}", action, control_url);

    let mut response = agent
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPAction", &soap_action_header)
        .send(body_xml)?;

    let status = response.status().as_u16();
    let raw_body = response.body_mut().read_to_string()?;

    // An unparsable body is reported through `raw_body`, not as a failure.
    let envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

    Ok(SoapCallResult {
        status,
        raw_body,
        envelope,
    })
}

/// Maps a call result to `Ok(())` when the action succeeded.
pub fn handle_action_response(action: &str, call_result: &SoapCallResult) -> Result<(), ControlError> {
    if let Some(err) = call_result.envelope.as_ref().and_then(parse_upnp_error) {
        return Err(ControlError::Upnp(
            action.to_string(),
            err.error_code,
            err.error_description,
            call_result.status,
        ));
    }

    if !(200..300).contains(&call_result.status) {
        return Err(ControlError::ActionWrongBody(
            action.to_string(),
            call_result.status,
            call_result.raw_body.clone(),
        ));
    }

    if call_result.envelope.is_none() {
        debug!("{} succeeded with a non-SOAP body", action);
    }

    Ok(())
}
