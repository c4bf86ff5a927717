//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::config::ResolvedConfig;
use crate::core::model::ConnectionState;
use crate::transport::adapter::{ChatTransport, CloseReason, TransportError};
use crate::transport::frame::{InboundFrame, OutboundFrame};

/// Transport that connects instantly, records every outbound frame, and
/// keeps each live link's inbound handle so tests can push frames at the
/// session as if the server had sent them.
pub struct FakeTransport {
    sent: Mutex<Vec<(String, OutboundFrame)>>,
    taps: Mutex<HashMap<String, mpsc::Sender<InboundFrame>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            sent: Mutex::new(Vec::new()),
            taps: Mutex::new(HashMap::new()),
        }
    }

    /// Outbound frames delivered on `chat_id`'s link, in order.
    pub fn sent_for(&self, chat_id: &str) -> Vec<OutboundFrame> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    /// Pushes a frame at the session through `chat_id`'s live link.
    ///
    /// Panics when the chat never linked; link first, then push.
    pub async fn push(&self, chat_id: &str, frame: InboundFrame) {
        let tap = self
            .taps
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .unwrap_or_else(|| panic!("no live link for chat {chat_id}"));
        tap.send(frame).await.expect("link receiver dropped");
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn run(
        &self,
        chat_id: &str,
        outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
        frames: mpsc::Sender<InboundFrame>,
    ) -> Result<CloseReason, TransportError> {
        frames
            .send(InboundFrame::Presence {
                chat_id: chat_id.to_string(),
                state: ConnectionState::Connected,
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
        self.taps
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), frames.clone());
        while let Some(frame) = outbound.recv().await {
            self.sent.lock().unwrap().push((chat_id.to_string(), frame));
        }
        Ok(CloseReason::Local)
    }
}

/// Resolved config with near-instant reconnect timings.
pub fn test_config() -> ResolvedConfig {
    ResolvedConfig {
        reconnect_base: Duration::from_millis(10),
        reconnect_cap: Duration::from_millis(40),
        ..ResolvedConfig::default()
    }
}
