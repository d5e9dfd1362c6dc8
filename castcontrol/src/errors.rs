use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("no compatible control service found for {0}")]
    NoCompatibleService(String),
    #[error("device description at {0} exposes no {1} controlURL")]
    MissingControlUrl(String, String),
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),
    #[error("XML parsing error: {0}")]
    Xml(String),
    #[error("Soap Error: cannot build {0} request: {1}")]
    SoapBuild(String, String),
    #[error("{0} returned UPnP error {1}: {2} (HTTP status {3})")]
    Upnp(String, u32, String, u16),
    #[error("{0} failed with HTTP status {1} and body: {2}")]
    ActionWrongBody(String, u16, String),
    #[error("cannot build stream metadata: {0}")]
    Metadata(#[from] castdidl::DidlError),
    #[error("set uri: {0}")]
    SetUri(#[source] Box<ControlError>),
    #[error("play: {0}")]
    Play(#[source] Box<ControlError>),
}

impl ControlError {
    pub fn xml(err: impl std::fmt::Display) -> Self {
        ControlError::Xml(err.to_string())
    }
}
