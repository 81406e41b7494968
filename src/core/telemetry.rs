//! Telemetry fan-out
//!
//! Polls the controller for lines it prints on its own and relays each one to
//! every connected client.

use super::context::GatewayContext;
use super::error::GatewayError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Most lines relayed per poll before giving writers a turn
const MAX_LINES_PER_POLL: usize = 32;

/// Background task relaying controller telemetry
pub struct TelemetryFanout {
    context: Arc<GatewayContext>,
    poll_interval: Duration,
}

impl TelemetryFanout {
    /// Create the task
    pub fn new(context: Arc<GatewayContext>, poll_interval: Duration) -> Self {
        Self {
            context,
            poll_interval,
        }
    }

    /// Relay one line to every registered session
    pub fn relay(&self, line: &str) {
        info!("Controller: {}", line);
        self.context.stats.lock().telemetry_lines += 1;
        match self.context.registry.broadcast(line) {
            Ok(delivered) => debug!("Telemetry delivered to {} session(s)", delivered),
            Err(e @ GatewayError::BroadcastPartialFailure { .. }) => warn!("{}", e),
            Err(e) => error!("Telemetry broadcast failed: {}", e),
        }
    }

    /// Poll until shutdown or until the controller link is gone
    pub async fn run(self, shutdown: CancellationToken) {
        if !self.context.coordinator.is_available() {
            warn!("No controller link, telemetry relay disabled");
            return;
        }

        info!("Telemetry relay started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Telemetry relay shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            for _ in 0..MAX_LINES_PER_POLL {
                match self.context.coordinator.try_read_line().await {
                    Ok(Some(line)) => self.relay(&line),
                    Ok(None) => break,
                    Err(e) => {
                        error!("Telemetry relay stopped: {}", e);
                        return;
                    }
                }
            }
        }
    }
}
