//! Gateway listener
//!
//! Owns the shared context, accepts client connections and supervises the
//! session and telemetry tasks until shutdown.

use super::context::{GatewayContext, GatewayStats};
use super::error::{GatewayError, GatewayResult};
use super::session::ClientSession;
use super::telemetry::TelemetryFanout;
use super::translator::OpcodeTable;
use super::transport::{LinkStats, SerialCoordinator, SerialLink};
use crate::config::GatewayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long shutdown waits for sessions to finish their current command
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The gateway: one controller link shared by many TCP clients
#[derive(Clone)]
pub struct Gateway {
    context: Arc<GatewayContext>,
    bind_addr: SocketAddr,
    max_line_length: usize,
    outbound_queue: usize,
    poll_interval: Duration,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Build a gateway around an optional controller link
    ///
    /// Without a link the gateway still serves clients; every command reports
    /// that the device is unavailable.
    pub fn new(config: &GatewayConfig, link: Option<Box<dyn SerialLink>>) -> GatewayResult<Self> {
        let bind_addr = config
            .server
            .bind_addr()
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        let table = OpcodeTable::from_config(&config.opcodes)?;
        let coordinator = SerialCoordinator::new(link);

        Ok(Self {
            context: Arc::new(GatewayContext::new(config.protocol.clone(), table, coordinator)),
            bind_addr,
            max_line_length: config.server.max_line_length,
            outbound_queue: config.server.outbound_queue,
            poll_interval: Duration::from_millis(config.serial.poll_interval_ms),
            shutdown: CancellationToken::new(),
        })
    }

    /// Shared state, for inspection
    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.context
    }

    /// Number of connected clients
    pub fn session_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Gateway counters
    pub fn stats(&self) -> GatewayStats {
        self.context.stats()
    }

    /// Controller link counters
    pub fn link_stats(&self) -> LinkStats {
        self.context.coordinator.stats()
    }

    /// Token that stops [`Gateway::serve`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind the configured address
    pub async fn bind(&self) -> GatewayResult<TcpListener> {
        TcpListener::bind(self.bind_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: self.bind_addr,
                source,
            })
    }

    /// Accept clients until shutdown, then drain and release the controller
    pub async fn serve(&self, listener: TcpListener) -> GatewayResult<()> {
        match listener.local_addr() {
            Ok(addr) => info!("Listening on {} ({})", addr, self.context.coordinator.description()),
            Err(e) => warn!("Listening on unknown address: {}", e),
        }

        let telemetry = tokio::spawn(
            TelemetryFanout::new(self.context.clone(), self.poll_interval)
                .run(self.shutdown.child_token()),
        );
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_session(&mut sessions, stream, peer),
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        info!("Shutting down, {} session(s) open", sessions.len());
        drop(listener);

        if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
            while sessions.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            warn!("Sessions did not finish in time, aborting");
            sessions.shutdown().await;
        }
        if let Err(e) = telemetry.await {
            warn!("Telemetry task failed: {}", e);
        }

        self.context.coordinator.close().await;
        Ok(())
    }

    fn spawn_session(&self, sessions: &mut JoinSet<()>, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_queue);
        let session = ClientSession::new(self.context.clone(), peer, outbound_tx);
        self.context.registry.register(session.handle());
        self.context.stats.lock().sessions_accepted += 1;
        info!("Active connections: {}", self.context.registry.len());

        sessions.spawn(session.run(
            stream,
            outbound_rx,
            self.max_line_length,
            self.shutdown.child_token(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_opcodes() {
        let mut config = GatewayConfig::default();
        config.opcodes.clear.clear();
        assert!(matches!(Gateway::new(&config, None), Err(GatewayError::Config(_))));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let mut config = GatewayConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        let first = Gateway::new(&config, None).unwrap();
        let listener = first.bind().await.unwrap();

        config.server.port = listener.local_addr().unwrap().port();
        let second = Gateway::new(&config, None).unwrap();
        assert!(matches!(second.bind().await, Err(GatewayError::Bind { .. })));
    }
}
