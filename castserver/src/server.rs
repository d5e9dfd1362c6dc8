//! # Module Server - HTTP listener for the cast stream
//!
//! Thin wrapper around an axum [`Router`]: handlers are registered before
//! [`Server::start`], which binds the listener and serves on its own task.
//! The renderer must only be told about the stream once the socket accepts
//! connections, see [`wait_until_listening`].

use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::handler::Handler;
use axum::routing::any;
use castconfig::get_config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpStream, sync::RwLock, task::JoinHandle};
use tracing::{debug, error, info};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// HTTP server hosting the stream routes.
pub struct Server {
    name: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    local_addr: Option<SocketAddr>,
    join_handle: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a server that will listen on `http_port`
    ///
    /// `http_port` 0 lets the OS pick a port, read it back from [`Server::start`].
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            local_addr: None,
            join_handle: None,
        }
    }

    pub fn new_configured() -> Self {
        Self::new("AudioCast", get_config().get_http_port())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn http_port(&self) -> u16 {
        self.local_addr
            .map(|addr| addr.port())
            .unwrap_or(self.http_port)
    }

    /// Registers `handler` at the exact `path` for every method; the handler
    /// is responsible for rejecting the methods it does not serve.
    pub async fn add_handler<H, T>(&mut self, path: &str, handler: H)
    where
        H: Handler<T, ()> + Clone + 'static,
        T: 'static,
    {
        let route = Router::new().route(path, any(handler));
        self.merge(route).await;
    }

    /// Merges a sub-router, which carries its own paths, into the main router.
    pub async fn add_router(&mut self, sub_router: Router) {
        self.merge(sub_router).await;
    }

    async fn merge(&mut self, route: Router) {
        let mut r = self.router.write().await;
        *r = std::mem::take(&mut *r).merge(route);
    }

    /// Snapshot of the routes registered so far.
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Binds the listener on all interfaces and serves on a background task.
    ///
    /// Returns the bound address; binding errors are reported here rather
    /// than on the serving task.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr {
            return Err(anyhow!("server {} already listening on {}", self.name, addr));
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("cannot bind HTTP listener on {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("Server {} listening on {}", self.name, local_addr);

        let router = self.router.read().await.clone();
        let name = self.name.clone();
        self.join_handle = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                error!("Server {} stopped: {}", name, e);
            }
        }));
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Waits for the serving task to end
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Stops serving; in-flight responses are dropped with their tasks.
    pub fn stop(&mut self) {
        if let Some(h) = self.join_handle.take() {
            h.abort();
            info!("Server {} stopped", self.name);
        }
    }
}

/// Polls `addr` with TCP connects until one succeeds or `timeout` elapses.
pub async fn wait_until_listening(addr: SocketAddr, timeout: Duration) -> Result<()> {
    let target = connect_address(addr);
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match TcpStream::connect(target).await {
            Ok(_) => {
                debug!("Listener on {} accepts connections", target);
                return Ok(());
            }
            Err(e) if tokio::time::Instant::now() >= deadline => {
                return Err(anyhow!("listener on {} not ready after {:?}: {}", target, timeout, e));
            }
            Err(_) => tokio::time::sleep(READINESS_POLL_INTERVAL).await,
        }
    }
}

// The wildcard address is not connectable everywhere, so loopback is tried instead.
fn connect_address(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
            SocketAddr::from(([127, 0, 0, 1], v4.port()))
        }
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
            SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, v6.port()))
        }
        other => other,
    }
}
