//! Connection registry for telemetry fan-out

use super::error::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique client session identifier
pub type SessionId = Uuid;

/// Registry entry for one connected client
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session ID
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    outbound: mpsc::Sender<String>,
}

impl SessionHandle {
    /// Create a handle delivering into `outbound`
    pub fn new(id: SessionId, peer: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self { id, peer, outbound }
    }
}

/// Tracks live sessions
///
/// A single lock covers registration, removal and broadcast iteration.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    pub fn register(&self, session: SessionHandle) {
        debug!("Registering session {} ({})", session.id, session.peer);
        self.sessions.lock().insert(session.id, session);
    }

    /// Remove a session; returns whether it was still registered
    pub fn unregister(&self, id: SessionId) -> bool {
        self.sessions.lock().remove(&id).is_some()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Whether a session is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    /// Queue a line for every registered session
    ///
    /// Sessions whose queue is closed are pruned and delivery continues to
    /// the rest. A session with a full queue misses this line but stays
    /// registered. Returns the number of sessions the line was queued for.
    pub fn broadcast(&self, line: &str) -> GatewayResult<usize> {
        let mut delivered = 0;
        let mut pruned = 0;

        self.sessions
            .lock()
            .retain(|id, session| match session.outbound.try_send(line.to_string()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Session {} is not keeping up, dropped telemetry line", id);
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Pruning closed session {} ({})", id, session.peer);
                    pruned += 1;
                    false
                }
            });

        if pruned > 0 {
            Err(GatewayError::BroadcastPartialFailure { delivered, pruned })
        } else {
            Ok(delivered)
        }
    }
}
