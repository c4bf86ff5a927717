//! # Transport Adapter
//!
//! The seam between the session runtime and whatever carries frames. The
//! production implementation speaks WebSocket (`transport::websocket`); tests
//! swap in a scripted fake. Everything above this trait deals in frames and
//! never sees sockets.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::transport::frame::{InboundFrame, OutboundFrame};

/// Errors surfaced by transport implementations.
#[derive(Debug)]
pub enum TransportError {
    /// Invalid endpoint configuration (unparseable URL). Not retryable.
    Config(String),
    /// Dial or handshake failure. Retryable with backoff.
    Connect(String),
    /// The socket failed mid-session. Retryable with backoff.
    Socket(String),
    /// The peer sent something unreadable at the protocol level. Retryable:
    /// a fresh connection usually clears it.
    Protocol(String),
    /// The session's frame channel is gone; the embedding surface is
    /// shutting down. Not retryable.
    ChannelClosed,
}

impl TransportError {
    /// Whether a supervisor should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect(_)
            | TransportError::Socket(_)
            | TransportError::Protocol(_) => true,
            TransportError::Config(_) | TransportError::ChannelClosed => false,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Config(msg) => write!(f, "transport config error: {msg}"),
            TransportError::Connect(msg) => write!(f, "connect failed: {msg}"),
            TransportError::Socket(msg) => write!(f, "socket error: {msg}"),
            TransportError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            TransportError::ChannelClosed => write!(f, "frame channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// How a connection session ended when it did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Our side hung up: the outbound channel was dropped.
    Local,
    /// The server closed the socket or the stream ended.
    Remote,
}

/// One realtime carrier, keyed by chat id.
///
/// `run` drives a single connection session to completion: it dials, emits a
/// `Presence` frame with `Connected` once the channel is live, then pumps
/// frames both ways until the connection ends. Outbound frames are read from
/// `outbound`; a closed `outbound` means the link was dropped and `run` must
/// close the connection and return `CloseReason::Local`. Reconnecting is the
/// caller's job (`transport::link`), which is why `outbound` is borrowed:
/// the receiver survives across attempts so queued frames are not lost.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Implementation name for logs.
    fn name(&self) -> &str;

    async fn run(
        &self,
        chat_id: &str,
        outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
        frames: mpsc::Sender<InboundFrame>,
    ) -> Result<CloseReason, TransportError>;
}
