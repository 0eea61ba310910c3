//! Connection actor
//!
//! One `ClientActor` per observer. It owns both halves of the transport and
//! runs two loops:
//! - the inbound loop reads and discards frames, only watching for errors,
//!   peer closes and missing liveness replies (read deadline)
//! - the outbound loop drains the private queue handed out by the hub,
//!   coalescing whatever is already queued into one frame, and sends a ping
//!   on every liveness tick
//!
//! Whichever loop fails first moves the actor to `Draining`: it records the
//! reason, cancels the shared token and unregisters from the hub. The other
//! loop observes the token and exits. The outbound loop owns the sink and is
//! the only place it gets closed.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tungstenite::error::{Error as WsError, ProtocolError};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::client::member::{ClientId, new_client_id};
use crate::config::ConnectionSettings;
use crate::hub::HubHandle;
use crate::transport::frame;
use crate::transport::message::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Registering,
    Active,
    Draining,
    Closed,
}

/// Why a connection ended. Every variant is terminal; observers reconnect
/// as a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The hub was not running when the connection tried to register.
    HubUnavailable,
    /// The peer sent a Close frame or the stream ended.
    PeerClosed,
    ReadFailed(String),
    /// Nothing, not even a pong, arrived within the read deadline.
    ReadTimeout,
    WriteFailed(String),
    WriteTimeout,
    /// The hub closed the outbound queue (eviction or shutdown).
    QueueClosed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::HubUnavailable => write!(f, "hub unavailable"),
            DisconnectReason::PeerClosed => write!(f, "closed by peer"),
            DisconnectReason::ReadFailed(e) => write!(f, "read failed: {e}"),
            DisconnectReason::ReadTimeout => write!(f, "read deadline expired"),
            DisconnectReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            DisconnectReason::WriteTimeout => write!(f, "write deadline expired"),
            DisconnectReason::QueueClosed => write!(f, "outbound queue closed by hub"),
        }
    }
}

pub struct ClientActor<Tx, Rx> {
    id: ClientId,
    hub: HubHandle,
    sink: Tx,
    stream: Rx,
    timings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
}

/// State shared by the two loops of a running actor.
struct Lifecycle {
    id: ClientId,
    hub: HubHandle,
    cancel: CancellationToken,
    reason: OnceLock<DisconnectReason>,
    state: watch::Sender<ConnectionState>,
}

impl Lifecycle {
    /// Starts the teardown. Only the first call has any effect.
    fn drain(&self, reason: DisconnectReason) {
        if self.reason.set(reason).is_ok() {
            self.state.send_replace(ConnectionState::Draining);
            self.cancel.cancel();
            self.hub.unregister(&self.id);
        }
    }
}

impl<Tx, Rx> ClientActor<Tx, Rx>
where
    Tx: Sink<WsMessage, Error = WsError> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<WsMessage, WsError>> + Unpin + Send + 'static,
{
    pub fn new(hub: HubHandle, sink: Tx, stream: Rx, timings: ConnectionSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Registering);
        Self {
            id: new_client_id(),
            hub,
            sink,
            stream,
            timings,
            state,
        }
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Subscribes to state transitions of this connection.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Registers with the hub, sends the connected notice and runs both
    /// loops until the connection ends. The transport is closed before this
    /// returns.
    pub async fn run(self) -> DisconnectReason {
        let ClientActor {
            id,
            hub,
            mut sink,
            stream,
            timings,
            state,
        } = self;
        let write_wait = timings.write_wait();

        let queue = match hub.register(id.clone()).await {
            Ok(queue) => queue,
            Err(e) => {
                warn!("Client {} could not register: {}", id, e);
                close_sink(&mut sink, write_wait, &id).await;
                state.send_replace(ConnectionState::Closed);
                return DisconnectReason::HubUnavailable;
            }
        };

        if let Err(reason) = send_connected(&mut sink, write_wait).await {
            warn!("Failed to send connected notice to {}: {}", id, reason);
            hub.unregister(&id);
            close_sink(&mut sink, write_wait, &id).await;
            state.send_replace(ConnectionState::Closed);
            return reason;
        }

        state.send_replace(ConnectionState::Active);
        debug!("Client {} active", id);

        let lifecycle = Arc::new(Lifecycle {
            id,
            hub,
            cancel: CancellationToken::new(),
            reason: OnceLock::new(),
            state,
        });

        let writer = tokio::spawn(write_loop(sink, queue, timings.clone(), lifecycle.clone()));
        read_loop(stream, timings.pong_wait(), &lifecycle).await;

        if let Err(e) = writer.await {
            error!("Write loop for {} aborted: {}", lifecycle.id, e);
            lifecycle.drain(DisconnectReason::WriteFailed(e.to_string()));
        }

        let reason = lifecycle
            .reason
            .get()
            .cloned()
            .unwrap_or(DisconnectReason::PeerClosed);
        lifecycle.state.send_replace(ConnectionState::Closed);
        info!("Client {} closed: {}", lifecycle.id, reason);
        reason
    }
}

async fn send_connected<Tx>(sink: &mut Tx, write_wait: Duration) -> Result<(), DisconnectReason>
where
    Tx: Sink<WsMessage, Error = WsError> + Unpin,
{
    let notice = serde_json::to_string(&ServerMessage::connected())
        .map_err(|e| DisconnectReason::WriteFailed(e.to_string()))?;
    write_frame(sink, WsMessage::text(notice), write_wait).await
}

async fn read_loop<Rx>(mut stream: Rx, pong_wait: Duration, lifecycle: &Lifecycle)
where
    Rx: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let id = &lifecycle.id;

    loop {
        // every received frame, pongs included, restarts the deadline
        let next = tokio::select! {
            biased;
            _ = lifecycle.cancel.cancelled() => return,
            next = timeout(pong_wait, stream.next()) => next,
        };

        match next {
            Err(_) => {
                warn!("Client {} missed its read deadline", id);
                lifecycle.drain(DisconnectReason::ReadTimeout);
                return;
            }
            Ok(None) => {
                debug!("Client {} stream ended", id);
                lifecycle.drain(DisconnectReason::PeerClosed);
                return;
            }
            Ok(Some(Err(e))) => {
                if is_quiet_close(&e) {
                    debug!("Client {} connection closed: {}", id, e);
                } else {
                    warn!("WebSocket error for {}: {}", id, e);
                }
                lifecycle.drain(DisconnectReason::ReadFailed(e.to_string()));
                return;
            }
            Ok(Some(Ok(WsMessage::Close(frame)))) => {
                log_close_frame(id, frame.as_ref());
                lifecycle.drain(DisconnectReason::PeerClosed);
                return;
            }
            Ok(Some(Ok(WsMessage::Pong(_)))) => trace!("Pong from {}", id),
            Ok(Some(Ok(_))) => trace!("Discarding inbound frame from {}", id),
        }
    }
}

async fn write_loop<Tx>(
    mut sink: Tx,
    mut queue: mpsc::Receiver<Bytes>,
    timings: ConnectionSettings,
    lifecycle: Arc<Lifecycle>,
) where
    Tx: Sink<WsMessage, Error = WsError> + Unpin,
{
    let id = &lifecycle.id;
    let write_wait = timings.write_wait();
    let period = timings.ping_interval();
    let ping = tokio::time::sleep(period);
    tokio::pin!(ping);

    loop {
        // a busy queue must not starve the ping, so the message arm also
        // pings once the deadline has passed
        tokio::select! {
            biased;
            _ = lifecycle.cancel.cancelled() => break,
            () = &mut ping => {
                if let Err(reason) = send_ping(&mut sink, write_wait, id).await {
                    lifecycle.drain(reason);
                    break;
                }
                ping.as_mut().reset(Instant::now() + period);
            }
            next = queue.recv() => match next {
                Some(first) => {
                    let (frame, count) = frame::coalesce(first, &mut queue);
                    trace!("Writing {} payload(s) to {}", count, id);
                    if let Err(reason) = write_frame(&mut sink, frame, write_wait).await {
                        debug!("Client {} write failed: {}", id, reason);
                        lifecycle.drain(reason);
                        break;
                    }
                    if ping.is_elapsed() {
                        if let Err(reason) = send_ping(&mut sink, write_wait, id).await {
                            lifecycle.drain(reason);
                            break;
                        }
                        ping.as_mut().reset(Instant::now() + period);
                    }
                }
                None => {
                    lifecycle.drain(DisconnectReason::QueueClosed);
                    if let Err(reason) = write_frame(&mut sink, WsMessage::Close(None), write_wait).await {
                        debug!("Could not send close notice to {}: {}", id, reason);
                    }
                    break;
                }
            },
        }
    }

    close_sink(&mut sink, write_wait, id).await;
}

async fn send_ping<Tx>(
    sink: &mut Tx,
    write_wait: Duration,
    id: &ClientId,
) -> Result<(), DisconnectReason>
where
    Tx: Sink<WsMessage, Error = WsError> + Unpin,
{
    trace!("Pinging {}", id);
    write_frame(sink, WsMessage::Ping(Bytes::new()), write_wait)
        .await
        .inspect_err(|reason| debug!("Client {} ping failed: {}", id, reason))
}

async fn write_frame<Tx>(
    sink: &mut Tx,
    frame: WsMessage,
    write_wait: Duration,
) -> Result<(), DisconnectReason>
where
    Tx: Sink<WsMessage, Error = WsError> + Unpin,
{
    match timeout(write_wait, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DisconnectReason::WriteFailed(e.to_string())),
        Err(_) => Err(DisconnectReason::WriteTimeout),
    }
}

async fn close_sink<Tx>(sink: &mut Tx, write_wait: Duration, id: &ClientId)
where
    Tx: Sink<WsMessage, Error = WsError> + Unpin,
{
    match timeout(write_wait, sink.close()).await {
        Ok(Ok(())) => trace!("Transport for {} closed", id),
        Ok(Err(e)) => debug!("Error closing transport for {}: {}", id, e),
        Err(_) => debug!("Timed out closing transport for {}", id),
    }
}

fn is_quiet_close(err: &WsError) -> bool {
    matches!(
        err,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

fn log_close_frame(id: &ClientId, frame: Option<&CloseFrame>) {
    match frame {
        Some(frame) if !matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
            warn!(
                "Client {} closed unexpectedly: code {} {}",
                id,
                u16::from(frame.code),
                frame.reason.as_str()
            );
        }
        _ => debug!("Client {} sent close", id),
    }
}
