//! HTTP endpoint serving the live stream and the cover art.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use bytes::Bytes;
use futures::StreamExt;
use tokio::process::ChildStdout;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use crate::pipeline::{CommandSpec, PipelineHandle};
use crate::profile::StreamConfig;

/// Identification sent with every response.
pub const SERVER_ID: &str = "AudioCast-DLNA UPnP/1.0 DLNADOC/1.50";
pub const LOGO_PATH: &str = "/logo.png";

static LOGO: &[u8] = include_bytes!("logo.png");

const CONTENT_FEATURES: HeaderName = HeaderName::from_static("contentfeatures.dlna.org");
const GET_CONTENT_FEATURES: HeaderName = HeaderName::from_static("getcontentfeatures.dlna.org");
const MEDIA_INFO: HeaderName = HeaderName::from_static("mediainfo.sec");
const GET_MEDIA_INFO: HeaderName = HeaderName::from_static("getmediainfo.sec");

/// Stream parameters and the commands spawned for each GET.
#[derive(Debug, Clone)]
pub struct StreamEndpoint {
    config: StreamConfig,
    capture: CommandSpec,
    transcode: CommandSpec,
    content_features: String,
}

impl StreamEndpoint {
    pub fn new(config: StreamConfig) -> Self {
        let capture = config.capture_command();
        let transcode = config.transcode_command();
        Self::with_commands(config, capture, transcode)
    }

    /// Same headers and framing as [`StreamEndpoint::new`], other programs.
    pub fn with_commands(config: StreamConfig, capture: CommandSpec, transcode: CommandSpec) -> Self {
        let content_features = config.content_features().to_string();
        Self {
            config,
            capture,
            transcode,
            content_features,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn path(&self) -> String {
        self.config.stream_path()
    }

    pub fn content_features(&self) -> &str {
        &self.content_features
    }

    fn is_chunked(&self, version: Version) -> bool {
        version == Version::HTTP_11 && !self.config.disable_chunked
    }

    fn response_headers(&self, request: &HeaderMap, chunked: bool) -> HeaderMap {
        let mut headers = HeaderMap::new();
        insert(&mut headers, header::CONTENT_TYPE, &self.config.mime());
        insert(&mut headers, header::CACHE_CONTROL, "no-cache, no-store");
        insert(&mut headers, header::PRAGMA, "no-cache");
        insert(&mut headers, header::EXPIRES, "0");
        insert(&mut headers, header::USER_AGENT, SERVER_ID);

        if requested(request, &GET_CONTENT_FEATURES) {
            insert(&mut headers, CONTENT_FEATURES, &self.content_features);
        }
        if requested(request, &GET_MEDIA_INFO) {
            let duration = self.config.duration_ms();
            insert(&mut headers, MEDIA_INFO, &format!("SEC_Duration={}", duration));
        }
        if !chunked {
            insert(
                &mut headers,
                header::CONTENT_LENGTH,
                &self.config.content_length().to_string(),
            );
        }
        headers
    }
}

/// Routes for the stream path and the logo.
pub fn stream_router(endpoint: Arc<StreamEndpoint>) -> Router {
    Router::new()
        .route(&endpoint.path(), any(stream_handler))
        .route(LOGO_PATH, any(logo_handler))
        .with_state(endpoint)
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => debug!("dropping invalid value for header {}", name),
    }
}

fn requested(headers: &HeaderMap, name: &HeaderName) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "1")
}

fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "GET, HEAD")],
    )
        .into_response()
}

fn log_request(req: &Request) {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    info!(
        "{:?} request from {}: {} {}",
        req.version(),
        remote,
        req.method(),
        req.uri()
    );
    for (name, value) in req.headers() {
        info!("  > {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
}

fn log_response(headers: &HeaderMap) {
    for (name, value) in headers {
        info!("  < {}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
}

async fn stream_handler(State(endpoint): State<Arc<StreamEndpoint>>, req: Request) -> Response {
    let method = req.method().clone();
    if method != Method::GET && method != Method::HEAD {
        return method_not_allowed();
    }

    let chunked = endpoint.is_chunked(req.version());
    let headers = endpoint.response_headers(req.headers(), chunked);

    if endpoint.config.print_headers {
        log_request(&req);
        log_response(&headers);
    }

    if method == Method::HEAD {
        // An empty stream has no size hint, so no `content-length: 0` is
        // added to a chunked HEAD response.
        let empty = futures::stream::empty::<Result<Bytes, std::io::Error>>();
        return (headers, Body::from_stream(empty)).into_response();
    }

    let mut pipeline = match PipelineHandle::spawn(&endpoint.capture, &endpoint.transcode) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("cannot start stream pipeline: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };
    let Some(output) = pipeline.take_output() else {
        error!("stream pipeline has no output");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    info!(
        chunked,
        "streaming {} to a new client",
        endpoint.config.codec()
    );
    let capacity = if chunked {
        endpoint.config.chunk_size()
    } else {
        COPY_BUFFER
    };
    (headers, pipeline_body(pipeline, output, capacity)).into_response()
}

const COPY_BUFFER: usize = 8 * 1024;

/// Body reading at most `capacity` bytes per frame. The pipeline lives as
/// long as the body: a finished or abandoned response tears it down.
fn pipeline_body(pipeline: PipelineHandle, output: ChildStdout, capacity: usize) -> Body {
    let stream = async_stream::stream! {
        let _pipeline = pipeline;
        let mut frames = ReaderStream::with_capacity(output, capacity);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => yield Ok::<Bytes, std::io::Error>(bytes),
                Err(e) => {
                    debug!("stream read stopped: {}", e);
                    break;
                }
            }
        }
        debug!("stream output closed");
    };
    Body::from_stream(stream)
}

async fn logo_handler(method: Method) -> Response {
    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (header::CONTENT_LENGTH, LOGO.len().to_string()),
    ];
    match method {
        Method::GET => (headers, Bytes::from_static(LOGO)).into_response(),
        Method::HEAD => headers.into_response(),
        _ => method_not_allowed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Codec;

    fn endpoint(codec: Codec) -> StreamEndpoint {
        StreamEndpoint::new(StreamConfig::new("audiocast.monitor", codec))
    }

    #[test]
    fn test_chunked_selection() {
        let mp3 = endpoint(Codec::Mp3);
        assert!(mp3.is_chunked(Version::HTTP_11));
        assert!(!mp3.is_chunked(Version::HTTP_10));

        let mut config = StreamConfig::new("src", Codec::Mp3);
        config.disable_chunked = true;
        assert!(!StreamEndpoint::new(config).is_chunked(Version::HTTP_11));
    }

    #[test]
    fn test_base_headers() {
        let headers = endpoint(Codec::Flac).response_headers(&HeaderMap::new(), true);
        assert_eq!(headers[header::CONTENT_TYPE], "audio/flac");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers[header::USER_AGENT], SERVER_ID);
        assert!(!headers.contains_key(header::CONTENT_LENGTH));
        assert!(!headers.contains_key(CONTENT_FEATURES));
        assert!(!headers.contains_key(MEDIA_INFO));
    }

    #[test]
    fn test_dlna_info_headers() {
        let mut request = HeaderMap::new();
        request.insert("getcontentfeatures.dlna.org", HeaderValue::from_static("1"));
        request.insert("getmediainfo.sec", HeaderValue::from_static("1"));

        let headers = endpoint(Codec::Mp3).response_headers(&request, false);
        assert_eq!(
            headers[CONTENT_FEATURES],
            "DLNA.ORG_PN=MP3;DLNA.ORG_CI=1;DLNA.ORG_FLAGS=01700000000000000000000000000000"
        );
        assert_eq!(headers[MEDIA_INFO], "SEC_Duration=31536000000");
        assert_eq!(headers[header::CONTENT_LENGTH], "1261440000000");
    }

    #[test]
    fn test_info_header_requires_one() {
        let mut request = HeaderMap::new();
        request.insert("getcontentfeatures.dlna.org", HeaderValue::from_static("0"));
        let headers = endpoint(Codec::Mp3).response_headers(&request, true);
        assert!(!headers.contains_key(CONTENT_FEATURES));
    }
}
