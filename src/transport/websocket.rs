//! WebSocket transport implementation.
//!
//! One socket per chat, dialed at `{socket_url}/{chat_id}`. Frames are JSON
//! text messages in both directions. A frame that fails to decode is logged
//! and skipped; the connection stays up. Reconnect policy lives a level up
//! in `transport::link`, this module only drives a single connection session.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Error as WsError, tungstenite::Message};

use crate::core::model::ConnectionState;
use crate::transport::adapter::{ChatTransport, CloseReason, TransportError};
use crate::transport::frame::{InboundFrame, OutboundFrame};

pub struct WebSocketTransport {
    socket_url: String,
    token: Option<String>,
}

impl WebSocketTransport {
    /// Creates a transport dialing under `socket_url` (e.g. `wss://host/ws`).
    /// The token, when present, is passed as a query parameter on each dial.
    pub fn new(socket_url: impl Into<String>, token: Option<String>) -> Self {
        WebSocketTransport {
            socket_url: socket_url.into(),
            token,
        }
    }

    fn chat_url(&self, chat_id: &str) -> String {
        let base = self.socket_url.trim_end_matches('/');
        match &self.token {
            Some(token) => format!("{base}/{chat_id}?token={token}"),
            None => format!("{base}/{chat_id}"),
        }
    }
}

/// Encodes and writes a single frame.
async fn send_frame<S>(sink: &mut S, frame: &OutboundFrame) -> Result<(), TransportError>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(frame)
        .map_err(|e| TransportError::Protocol(format!("frame encode failed: {e}")))?;
    debug!("outbound frame: {text}");
    sink.send(Message::Text(text))
        .await
        .map_err(|e| TransportError::Socket(e.to_string()))
}

/// Truncates wire text for log lines.
fn snippet(text: &str) -> String {
    text.chars().take(120).collect()
}

#[async_trait]
impl ChatTransport for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn run(
        &self,
        chat_id: &str,
        outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
        frames: mpsc::Sender<InboundFrame>,
    ) -> Result<CloseReason, TransportError> {
        let url = self.chat_url(chat_id);
        debug!("dialing {} for chat {chat_id}", self.socket_url);
        let (ws, response) = connect_async(url.as_str()).await.map_err(|e| match e {
            WsError::Url(e) => TransportError::Config(e.to_string()),
            other => TransportError::Connect(other.to_string()),
        })?;
        debug!(
            "websocket handshake for chat {chat_id}: HTTP {}",
            response.status()
        );
        if frames
            .send(InboundFrame::Presence {
                chat_id: chat_id.to_string(),
                state: ConnectionState::Connected,
            })
            .await
            .is_err()
        {
            return Err(TransportError::ChannelClosed);
        }
        info!("chat {chat_id} connected");

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                queued = outbound.recv() => match queued {
                    Some(mut frame) => {
                        // Coalesce a run of typing signals that piled up while
                        // the socket was down; the newest one wins. Message
                        // sends always go out, in order.
                        while frame.is_typing() {
                            match outbound.try_recv() {
                                Ok(next) if next.supersedes(&frame) => {
                                    debug!("coalesced typing frame for chat {chat_id}");
                                    frame = next;
                                }
                                Ok(next) => {
                                    send_frame(&mut sink, &frame).await?;
                                    frame = next;
                                }
                                Err(_) => break,
                            }
                        }
                        send_frame(&mut sink, &frame).await?;
                    }
                    None => {
                        debug!("outbound channel closed, hanging up chat {chat_id}");
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(CloseReason::Local);
                    }
                },
                received = stream.next() => match received {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(InboundFrame::Unknown) => {
                                warn!("skipping unrecognized frame kind: {}", snippet(&text));
                            }
                            Ok(frame) => {
                                if frames.send(frame).await.is_err() {
                                    return Err(TransportError::ChannelClosed);
                                }
                            }
                            Err(e) => {
                                warn!("undecodable frame on chat {chat_id}: {e} ({})", snippet(&text));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = sink.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("server closed chat {chat_id}");
                        return Ok(CloseReason::Remote);
                    }
                    Some(Ok(other)) => {
                        debug!("ignoring non-text websocket message ({} bytes)", other.len());
                    }
                    Some(Err(e)) => return Err(TransportError::Socket(e.to_string())),
                    None => {
                        info!("websocket stream ended for chat {chat_id}");
                        return Ok(CloseReason::Remote);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_joins_and_trims() {
        let t = WebSocketTransport::new("ws://localhost:8080/ws/", None);
        assert_eq!(t.chat_url("c1"), "ws://localhost:8080/ws/c1");
    }

    #[test]
    fn test_chat_url_appends_token() {
        let t = WebSocketTransport::new("wss://chat.example.com/ws", Some("cfb-1".to_string()));
        assert_eq!(t.chat_url("c1"), "wss://chat.example.com/ws/c1?token=cfb-1");
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long: String = "é".repeat(200);
        assert_eq!(snippet(&long).chars().count(), 120);
        assert_eq!(snippet("short"), "short");
    }
}
