use anyhow::{Result, anyhow};
use castcontrol::{RendererDescriptor, RendererSession, StreamFormat, TransportController};
use castdidl::ContentFeatures;
use std::env;
use std::thread;
use std::time::Duration;

// Usage: play_uri <description-location> <service-id> <mp3-uri> [seconds]
fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        return Err(anyhow!(
            "usage: {} <location> <service-id> <uri> [seconds]",
            args[0]
        ));
    }
    let seconds: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(30);

    let descriptor = RendererDescriptor::new(&args[1], &args[2]);
    let session = RendererSession::new(descriptor.clone(), &args[3], "");
    let format = StreamFormat {
        mime: "audio/mpeg".to_string(),
        content_features: ContentFeatures::live("MP3").to_string(),
        bit_depth: 16,
        sample_rate: 44100,
        channels: 2,
    };

    let controller = TransportController::new();
    controller.start(&session, &format)?;
    println!("Playing {} for {}s", args[3], seconds);

    thread::sleep(Duration::from_secs(seconds));
    controller.stop(&descriptor);
    Ok(())
}
