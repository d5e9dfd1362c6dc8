//! # castaudio
//!
//! Live audio stream served over HTTP: the system audio is captured, piped
//! through a transcoder and sent to each client as an endless body.
//!
//! - [`profile`]: codecs, stream parameters and the derived command lines
//! - [`pipeline`]: the capture/transcode process pair behind one response
//! - [`endpoint`]: the HTTP handlers for `/stream.<ext>` and `/logo.png`
//!
//! ## Usage
//!
//! ```no_run
//! use castaudio::{AudioStreamExt, Codec, StreamConfig, StreamEndpoint};
//! use castserver::Server;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = StreamConfig::new("audiocast.monitor", Codec::Flac);
//! let mut server = Server::new("AudioCast", 9000);
//! let path = server.add_audio_stream(StreamEndpoint::new(config)).await;
//! server.start().await?;
//! println!("serving {}", path);
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod pipeline;
pub mod profile;

use std::sync::Arc;

pub use endpoint::{LOGO_PATH, SERVER_ID, StreamEndpoint, stream_router};
pub use pipeline::{CommandSpec, PipelineError, PipelineHandle};
pub use profile::{Codec, ProfileError, StreamConfig, YEAR_SECONDS};

/// Extension trait adding the audio stream routes to a [`castserver::Server`].
#[async_trait::async_trait]
pub trait AudioStreamExt {
    /// Registers the stream and logo routes; returns the stream path.
    async fn add_audio_stream(&mut self, endpoint: StreamEndpoint) -> String;
}

#[async_trait::async_trait]
impl AudioStreamExt for castserver::Server {
    async fn add_audio_stream(&mut self, endpoint: StreamEndpoint) -> String {
        let path = endpoint.path();
        tracing::info!(
            "{}: {} stream at {}",
            self.name(),
            endpoint.config().codec(),
            path
        );
        self.add_router(stream_router(Arc::new(endpoint))).await;
        path
    }
}
