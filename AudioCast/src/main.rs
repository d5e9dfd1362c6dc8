mod deps;
mod shutdown;
mod sink;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use castaudio::{AudioStreamExt, LOGO_PATH, StreamConfig, StreamEndpoint};
use castconfig::get_config;
use castcontrol::{
    RendererDescriptor, RendererSession, StreamFormat, TransportController, stream_scheme,
};
use castserver::logs::{LoggingOptions, init_logging};
use castserver::net::{build_url, guess_local_ip};
use castserver::{Server, wait_until_listening};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::shutdown::{CastCleanup, ShutdownContext};

const LISTEN_TIMEOUT: Duration = Duration::from_secs(5);

type CastShutdown = ShutdownContext<CastCleanup>;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingOptions::from_config());
    let config = get_config();

    // ========== Startup checks ==========
    let stream = StreamConfig::from_config(&config).context("invalid stream configuration")?;
    deps::check_dependencies(&[
        sink::PACTL,
        stream.capture_program.as_str(),
        stream.transcode_program.as_str(),
    ])?;

    let location = config
        .get_renderer_location()
        .ok_or_else(|| anyhow!("renderer.location is not configured"))?;
    let descriptor = RendererDescriptor::new(location, config.get_renderer_service_id());
    descriptor.transport_version()?;

    let controller = TransportController::new();
    let context = Arc::new(ShutdownContext::new(CastCleanup::new(
        controller.clone(),
        descriptor.clone(),
    )));

    let stop = CancellationToken::new();
    tokio::spawn(wait_for_signal(stop.clone()));

    // ========== Cast ==========
    let mut server = Server::new_configured();
    let result = tokio::select! {
        result = run(&mut server, &stream, controller, descriptor, &context) => result,
        _ = stop.cancelled() => Ok(()),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }

    // ========== Shutdown ==========
    server.stop();
    let cleanup = context.clone();
    tokio::task::spawn_blocking(move || cleanup.run())
        .await
        .context("cleanup task failed")?;
    result
}

async fn run(
    server: &mut Server,
    stream: &StreamConfig,
    controller: TransportController,
    descriptor: RendererDescriptor,
    context: &Arc<CastShutdown>,
) -> Result<()> {
    if sink::is_virtual_monitor(&stream.source) {
        let module = tokio::task::spawn_blocking(|| sink::load_null_sink(sink::PACTL)).await??;
        context.set_sink_module(Some(module));
    }

    let path = server
        .add_audio_stream(StreamEndpoint::new(stream.clone()))
        .await;
    let addr: SocketAddr = server.start().await?;
    wait_until_listening(addr, LISTEN_TIMEOUT).await?;

    let host = get_config()
        .get_stream_address()
        .unwrap_or_else(|| guess_local_ip().to_string());
    let port = addr.port();
    let format = StreamFormat {
        mime: stream.mime(),
        content_features: stream.content_features().to_string(),
        bit_depth: stream.bit_depth(),
        sample_rate: stream.sample_rate(),
        channels: stream.channels(),
    };

    let session = tokio::task::spawn_blocking(move || -> Result<RendererSession> {
        let description = controller.describe(&descriptor)?;
        info!(
            "Renderer: {} ({})",
            description.friendly_name.as_deref().unwrap_or("unknown"),
            description.manufacturer.as_deref().unwrap_or("unknown manufacturer")
        );
        let client = controller.client_for(&descriptor, &description)?;
        let session = RendererSession::new(
            descriptor,
            build_url(stream_scheme(&description), &host, port, &path),
            build_url("http", &host, port, LOGO_PATH),
        );
        info!("Casting {}", session.stream_url);
        controller.set_and_play(&client, &session, &format)?;
        Ok(session)
    })
    .await??;

    context.set_playing(true);
    info!("✅ AudioCast is playing on {}", session.descriptor.location);
    info!("Press Ctrl+C to stop...");
    server.wait().await;
    Ok(())
}

async fn wait_for_signal(stop: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut interrupt), Ok(mut terminate), Ok(mut hangup)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
            signal(SignalKind::hangup()),
        ) else {
            error!("cannot install signal handlers");
            return;
        };
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = hangup.recv() => "SIGHUP",
        };
        info!("Received {}, shutting down...", name);
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Received Ctrl+C, shutting down...");
    }
    stop.cancel();
}
