//! Server module that wires the state engine to the network.
//!
//! This module coordinates:
//! - The state engine (one instance, shared by both schema versions)
//! - The `state.v1` and `state.v1alpha1` gRPC services on a single listener
//! - The expiry sweeper background task
//! - Graceful shutdown, with a final flush of the engine

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::api::{v1, v1alpha1, StoreAdapter, V1Alpha1, V1};
use crate::storage::{ExpirySweeper, StateEngine};

/// State store server. The engine starts uninitialized; the runtime sends `Init`.
pub struct StateServer {
    config: ServerConfig,
    engine: Arc<StateEngine>,
    background_tasks: Vec<JoinHandle<()>>,
}

/// Configuration for the state store server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host name or address to bind.
    pub host: String,

    /// TCP port to bind.
    pub port: u16,

    /// Interval of the expiry sweeper in milliseconds (0 disables it).
    pub ttl_sweep_interval_ms: u64,

    /// HTTP/2 keepalive ping interval in seconds.
    pub keepalive_interval_secs: u64,

    /// HTTP/2 keepalive ping timeout in seconds.
    pub keepalive_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9191,
            ttl_sweep_interval_ms: 1000,
            keepalive_interval_secs: 10,
            keepalive_timeout_secs: 20,
        }
    }
}

impl StateServer {
    pub fn new(config: ServerConfig) -> Self {
        info!(host = %config.host, port = config.port, "Initializing state store server");

        Self {
            config,
            engine: Arc::new(StateEngine::new()),
            background_tasks: Vec::new(),
        }
    }

    /// Run the server until `shutdown` resolves or the listener fails.
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) -> anyhow::Result<()> {
        let addr = resolve_listen_addr(&self.config.host, self.config.port)?;

        if self.config.ttl_sweep_interval_ms > 0 {
            let sweeper = ExpirySweeper::new(
                self.engine.clone(),
                Duration::from_millis(self.config.ttl_sweep_interval_ms),
            );
            self.background_tasks.push(sweeper.run());
        } else {
            info!("Expiry sweeper disabled");
        }

        let v1_service = StoreAdapter::<V1>::new(self.engine.clone());
        let v1alpha1_service = StoreAdapter::<V1Alpha1>::new(self.engine.clone());

        info!(addr = %addr, "Starting gRPC server");

        let server = Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(
                self.config.keepalive_interval_secs,
            )))
            .http2_keepalive_timeout(Some(Duration::from_secs(
                self.config.keepalive_timeout_secs,
            )))
            .add_service(v1::StoreServer::new(v1_service))
            .add_service(v1alpha1::StoreServer::new(v1alpha1_service))
            .serve_with_shutdown(addr, shutdown);

        info!("State store listening on {}", addr);

        let result = server.await;

        info!("State store shutting down");
        self.shutdown().await;

        result?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        if self.engine.is_initialized() {
            if let Err(e) = self.engine.flush().await {
                warn!(error = %e, "Final flush failed");
            }
        }
    }

    /// Get reference to the state engine.
    pub fn engine(&self) -> Arc<StateEngine> {
        self.engine.clone()
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Resolve the listen address. A `http://` prefix on the host is tolerated.
fn resolve_listen_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let host = host
        .strip_prefix("http://")
        .or_else(|| host.strip_prefix("https://"))
        .unwrap_or(host);

    (host, port)
        .to_socket_addrs()
        .map_err(|e| anyhow::anyhow!("Failed to resolve listen address {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("No address found for {}:{}", host, port))
}
