//! Client session handling
//!
//! A session reads one command per line, forwards it to the controller and
//! answers with a best-effort acknowledgement. Outbound traffic (acks and
//! telemetry) goes through a bounded queue drained by a writer task, so a slow
//! client never stalls the telemetry fan-out.

use super::command::Command;
use super::context::GatewayContext;
use super::error::{GatewayError, GatewayResult};
use super::registry::{SessionHandle, SessionId};
use super::route::{PlaceOutcome, RouteScope, RouteSelectionSet};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a closing session waits for queued lines to reach the client
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next command line
    AwaitingCommand,
    /// Disconnected
    Closed,
}

/// Acknowledgement sent back after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command forwarded
    Ok,
    /// Command forwarded and the route selection is now complete
    Ready,
    /// Command not forwarded
    Error(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Ready => write!(f, "READY"),
            Self::Error(reason) => write!(f, "ERR {reason}"),
        }
    }
}

/// What the session loop does after a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFlow {
    /// Keep reading, optionally acknowledging
    Continue(Reply),
    /// End the session
    Close,
}

/// One framed line of client input
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClientLine {
    /// A complete line within the length limit
    Text(String),
    /// A line over the limit; its bytes are discarded up to the next newline
    Overlong,
}

/// Line framing that reports over-long lines as items instead of errors
///
/// `FramedRead` ends the stream after a decoder error, so the length limit
/// is reported as an item.
struct ClientLineCodec {
    inner: LinesCodec,
}

impl ClientLineCodec {
    fn new(max_line_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_length),
        }
    }

    fn map(decoded: Result<Option<String>, LinesCodecError>) -> GatewayResult<Option<ClientLine>> {
        match decoded {
            Ok(line) => Ok(line.map(ClientLine::Text)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(ClientLine::Overlong)),
            Err(LinesCodecError::Io(e)) => Err(GatewayError::ClientIo(e)),
        }
    }
}

impl Decoder for ClientLineCodec {
    type Item = ClientLine;
    type Error = GatewayError;

    fn decode(&mut self, buf: &mut BytesMut) -> GatewayResult<Option<ClientLine>> {
        Self::map(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> GatewayResult<Option<ClientLine>> {
        Self::map(self.inner.decode_eof(buf))
    }
}

/// One connected client
pub struct ClientSession {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    context: Arc<GatewayContext>,
    route: RouteSelectionSet,
    outbound: mpsc::Sender<String>,
}

impl ClientSession {
    /// Create a session delivering acknowledgements into `outbound`
    pub fn new(context: Arc<GatewayContext>, peer: SocketAddr, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            state: SessionState::AwaitingCommand,
            context,
            route: RouteSelectionSet::new(),
            outbound,
        }
    }

    /// Session ID
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Registry entry for this session
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.id, self.peer, self.outbound.clone())
    }

    /// Whether the route selection is complete and waiting for a start
    pub fn route_ready(&self) -> bool {
        match self.context.protocol.route_scope {
            RouteScope::Session => self.route.is_ready(),
            RouteScope::Gateway => self.context.shared_route.lock().is_ready(),
        }
    }

    /// Process one client line
    pub async fn handle_line(&mut self, line: &str) -> SessionFlow {
        let command = match Command::parse(line, &self.context.protocol.disconnect_message) {
            Ok(command) => command,
            Err(e) => return SessionFlow::Continue(self.reject(e)),
        };

        if command == Command::Disconnect {
            info!("Session {}: client requested disconnect", self.id);
            return SessionFlow::Close;
        }

        debug!("Session {}: received {}", self.id, command);

        let frames = match self.context.table.translate(&command) {
            Ok(frames) => frames,
            Err(e) => return SessionFlow::Continue(self.reject(e)),
        };

        if let Err(e) = self.context.coordinator.write(frames).await {
            return SessionFlow::Continue(self.reject(e));
        }

        self.context.stats.lock().commands_forwarded += 1;
        SessionFlow::Continue(self.apply(&command))
    }

    fn reject(&self, error: GatewayError) -> Reply {
        {
            let mut stats = self.context.stats.lock();
            match error {
                GatewayError::UnrecognizedCommand(_) => stats.commands_rejected += 1,
                GatewayError::DeviceUnavailable => stats.device_failures += 1,
                _ => {}
            }
        }
        warn!("Session {}: {}", self.id, error);
        Reply::Error(error.client_reason())
    }

    fn with_route<R>(&mut self, f: impl FnOnce(&mut RouteSelectionSet) -> R) -> R {
        match self.context.protocol.route_scope {
            RouteScope::Session => f(&mut self.route),
            RouteScope::Gateway => f(&mut self.context.shared_route.lock()),
        }
    }

    /// Update route state for a command the controller accepted
    fn apply(&mut self, command: &Command) -> Reply {
        let id = self.id;
        match command {
            Command::Clear => {
                self.with_route(RouteSelectionSet::clear);
                info!("Session {}: route cleared", id);
                Reply::Ok
            }
            Command::Place {
                room_bed,
                compartment,
            } => match self.with_route(|route| route.place(*compartment)) {
                PlaceOutcome::Ready => {
                    info!(
                        "Session {}: compartment {} -> {}, route ready to start",
                        id, compartment, room_bed
                    );
                    Reply::Ready
                }
                PlaceOutcome::Added => {
                    info!("Session {}: compartment {} -> {}", id, compartment, room_bed);
                    Reply::Ok
                }
                PlaceOutcome::Duplicate => {
                    debug!("Session {}: compartment {} reassigned to {}", id, compartment, room_bed);
                    Reply::Ok
                }
            },
            Command::Start => {
                if self.route_ready() {
                    info!("Session {}: route started", id);
                } else {
                    warn!("Session {}: route started before all compartments were assigned", id);
                }
                Reply::Ok
            }
            Command::Extra(args) => {
                debug!("Session {}: extra instruction ({:?})", id, args);
                Reply::Ok
            }
            Command::Disconnect => Reply::Ok,
        }
    }

    fn acknowledge(&mut self, reply: Reply) {
        if !self.context.protocol.acknowledge {
            return;
        }
        match self.outbound.try_send(reply.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Session {}: outbound queue full, acknowledgement dropped", self.id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {}: writer gone", self.id);
                self.state = SessionState::Closed;
            }
        }
    }

    /// Serve the client until it disconnects or the gateway shuts down
    ///
    /// `outbound_rx` is the receiving end of this session's queue. The
    /// session unregisters itself before returning.
    pub async fn run<S>(
        mut self,
        stream: S,
        outbound_rx: mpsc::Receiver<String>,
        max_line_length: usize,
        shutdown: CancellationToken,
    ) where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(reader, ClientLineCodec::new(max_line_length));
        let mut writer_task = tokio::spawn(forward_outbound(
            FramedWrite::new(writer, LinesCodec::new()),
            outbound_rx,
        ));

        info!("Session {} connected from {}", self.id, self.peer);

        while self.state == SessionState::AwaitingCommand {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("Session {}: gateway shutting down", self.id);
                    break;
                }
                next = lines.next() => next,
            };

            match next {
                Some(Ok(ClientLine::Text(line))) => match self.handle_line(&line).await {
                    SessionFlow::Continue(reply) => self.acknowledge(reply),
                    SessionFlow::Close => self.state = SessionState::Closed,
                },
                Some(Ok(ClientLine::Overlong)) => {
                    let reply = self.reject(GatewayError::UnrecognizedCommand(format!(
                        "line longer than {max_line_length} bytes"
                    )));
                    self.acknowledge(reply);
                }
                Some(Err(e)) => {
                    warn!("Session {}: {}", self.id, e);
                    self.state = SessionState::Closed;
                }
                None => {
                    debug!("Session {}: end of stream", self.id);
                    self.state = SessionState::Closed;
                }
            }
        }

        let id = self.id;
        let peer = self.peer;
        self.context.registry.unregister(id);
        // Last sender gone; the writer drains what is queued and exits
        drop(self);

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task)
            .await
            .is_err()
        {
            warn!("Session {}: client not reading, dropping queued output", id);
            writer_task.abort();
        }
        info!("Session {} ({}) closed", id, peer);
    }
}

async fn forward_outbound<W>(mut sink: FramedWrite<W, LinesCodec>, mut outbound_rx: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound_rx.recv().await {
        if let Err(e) = sink.send(line).await {
            debug!("Outbound write failed: {}", e);
            break;
        }
    }
}
