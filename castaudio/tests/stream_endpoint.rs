//! Stream and logo routes driven through the router, with stand-in programs
//! for the capture and transcode stages.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, Version, header};
use axum::response::Response;
use castaudio::{Codec, CommandSpec, StreamConfig, StreamEndpoint, stream_router};
use http_body_util::BodyExt;
use tower::ServiceExt;

fn shell(script: String) -> CommandSpec {
    CommandSpec::new("sh", vec!["-c".to_string(), script])
}

fn endpoint_with(config: StreamConfig) -> Arc<StreamEndpoint> {
    Arc::new(StreamEndpoint::with_commands(
        config,
        CommandSpec::new("yes", Vec::<String>::new()),
        CommandSpec::new("cat", Vec::<String>::new()),
    ))
}

fn mp3_endpoint() -> Arc<StreamEndpoint> {
    endpoint_with(StreamConfig::new("audiocast.monitor", Codec::Mp3))
}

async fn send(
    endpoint: Arc<StreamEndpoint>,
    method: Method,
    path: &str,
    version: Version,
) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .version(version)
        .header("getContentFeatures.dlna.org", "1")
        .body(Body::empty())
        .unwrap();
    stream_router(endpoint).oneshot(request).await.unwrap()
}

#[tokio::test]
async fn head_matches_get_headers_when_chunked() {
    let endpoint = mp3_endpoint();
    let head = send(endpoint.clone(), Method::HEAD, "/stream.mp3", Version::HTTP_11).await;
    let get = send(endpoint, Method::GET, "/stream.mp3", Version::HTTP_11).await;

    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(head.headers(), get.headers());
    assert!(!get.headers().contains_key(header::CONTENT_LENGTH));
    assert_eq!(get.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert!(get.headers().contains_key("contentfeatures.dlna.org"));

    let head_body = head.into_body().collect().await.unwrap().to_bytes();
    assert!(head_body.is_empty());
}

#[tokio::test]
async fn http10_gets_fixed_content_length() {
    let endpoint = mp3_endpoint();
    let head = send(endpoint.clone(), Method::HEAD, "/stream.mp3", Version::HTTP_10).await;
    let get = send(endpoint, Method::GET, "/stream.mp3", Version::HTTP_10).await;

    assert_eq!(head.headers(), get.headers());
    assert_eq!(get.headers()[header::CONTENT_LENGTH], "1261440000000");
}

#[tokio::test]
async fn disabled_chunking_uses_content_length() {
    let mut config = StreamConfig::new("src", Codec::Wav);
    config.disable_chunked = true;
    let response = send(endpoint_with(config), Method::HEAD, "/stream.wav", Version::HTTP_11).await;
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        (31_536_000u64 * 44_100 * 16 * 2).to_string()
    );
}

#[tokio::test]
async fn lpcm_announces_rate_and_channels() {
    let config = StreamConfig::new("src", Codec::Lpcm)
        .with_format(16, 48000, 2)
        .unwrap();
    let response = send(endpoint_with(config), Method::HEAD, "/stream.lpcm", Version::HTTP_11).await;
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "audio/L16;rate=48000;channels=2"
    );
}

#[tokio::test]
async fn other_methods_are_rejected() {
    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let response = send(mp3_endpoint(), method.clone(), "/stream.mp3", Version::HTTP_11).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);

        let response = send(mp3_endpoint(), method.clone(), "/logo.png", Version::HTTP_11).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
    }
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let response = send(mp3_endpoint(), Method::GET, "/stream.flac", Version::HTTP_11).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logo_is_served_with_exact_length() {
    let get = send(mp3_endpoint(), Method::GET, "/logo.png", Version::HTTP_11).await;
    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(get.headers()[header::CONTENT_TYPE], "image/png");
    let length: usize = get.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let body = get.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), length);
    assert!(body.starts_with(b"\x89PNG"));

    let head = send(mp3_endpoint(), Method::HEAD, "/logo.png", Version::HTTP_11).await;
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(head.headers()[header::CONTENT_LENGTH], length.to_string());
}

#[tokio::test]
async fn start_failure_is_a_server_error() {
    let endpoint = Arc::new(StreamEndpoint::with_commands(
        StreamConfig::new("src", Codec::Mp3),
        CommandSpec::new("audiocast-no-such-capture", Vec::<String>::new()),
        CommandSpec::new("cat", Vec::<String>::new()),
    ));
    let response = send(endpoint, Method::GET, "/stream.mp3", Version::HTTP_11).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn get_streams_pipeline_output() {
    let response = send(mp3_endpoint(), Method::GET, "/stream.mp3", Version::HTTP_11).await;
    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let data = frame.into_data().unwrap();
    assert!(data.starts_with(b"y\n"));
    assert!(data.len() <= 40_000);
}

fn read_pids(file: &Path) -> Vec<u32> {
    std::fs::read_to_string(file)
        .unwrap_or_default()
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect()
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_kills_both_processes() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pids");
    let pid_path = pid_file.display().to_string();

    let endpoint = Arc::new(StreamEndpoint::with_commands(
        StreamConfig::new("src", Codec::Mp3),
        shell(format!("echo $$ >> '{}'; exec yes", pid_path)),
        shell(format!("echo $$ >> '{}'; exec cat", pid_path)),
    ));

    let response = send(endpoint, Method::GET, "/stream.mp3", Version::HTTP_11).await;
    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    assert!(frame.is_data());

    let pids = read_pids(&pid_file);
    assert_eq!(pids.len(), 2, "pids: {:?}", pids);
    for pid in &pids {
        assert!(Path::new(&format!("/proc/{}", pid)).exists());
    }

    drop(body);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let alive: Vec<_> = pids
            .iter()
            .filter(|pid| Path::new(&format!("/proc/{}", pid)).exists())
            .collect();
        if alive.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "still running after disconnect: {:?}",
            alive
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
