//! # castserver - HTTP serving for AudioCast
//!
//! - [`server`] : axum router wrapper, background listener and readiness check
//! - [`logs`] : tracing subscriber initialisation
//! - [`net`] : local address guess and URL host formatting
//!
//! ```rust,no_run
//! use castserver::{Server, wait_until_listening};
//! use std::time::Duration;
//!
//! # async fn hello() -> &'static str { "hello" }
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new("AudioCast", 9000);
//!     server.add_handler("/hello", hello).await;
//!     let addr = server.start().await?;
//!     wait_until_listening(addr, Duration::from_secs(5)).await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod net;
pub mod server;

pub use server::{Server, wait_until_listening};
