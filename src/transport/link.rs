//! # Link Supervision
//!
//! `LinkSet` owns the realtime connections for subscribed chats. Each link is
//! a pair of background tasks:
//!
//! - a supervisor that drives `ChatTransport::run` in a loop, synthesizing
//!   `Presence` frames around each attempt and reconnecting with capped
//!   exponential backoff after drops,
//! - a forwarder that stamps inbound frames with the receipt time and pushes
//!   them onto the session's intent channel.
//!
//! The store only ever learns about connection lifecycle through `Presence`
//! frames, so locally synthesized and server-sent presence take the same
//! path through the reducer.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::core::intent::Intent;
use crate::core::model::ConnectionState;
use crate::transport::adapter::{ChatTransport, CloseReason};
use crate::transport::frame::{InboundFrame, OutboundFrame};

/// Sessions shorter than this are treated as flapping and keep the current
/// backoff; anything longer resets it.
const STABLE_SESSION: Duration = Duration::from_secs(5);

/// Inbound frame buffer per link.
const FRAME_BUFFER: usize = 100;

/// Doubles the reconnect delay up to `cap`.
pub fn next_delay(current: Duration, cap: Duration) -> Duration {
    current.saturating_mul(2).min(cap)
}

async fn send_presence(
    frames: &mpsc::Sender<InboundFrame>,
    chat_id: &str,
    state: ConnectionState,
) -> Result<(), ()> {
    frames
        .send(InboundFrame::Presence {
            chat_id: chat_id.to_string(),
            state,
        })
        .await
        .map_err(|_| ())
}

/// Drives one chat's connection until the link is dropped or the transport
/// fails permanently.
async fn supervise(
    transport: Arc<dyn ChatTransport>,
    chat_id: String,
    mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    frames: mpsc::Sender<InboundFrame>,
    base: Duration,
    cap: Duration,
) {
    let mut delay = base;
    loop {
        if send_presence(&frames, &chat_id, ConnectionState::Connecting)
            .await
            .is_err()
        {
            return;
        }
        let started = Instant::now();
        match transport.run(&chat_id, &mut outbound, frames.clone()).await {
            Ok(CloseReason::Local) => {
                let _ = send_presence(&frames, &chat_id, ConnectionState::Disconnected).await;
                return;
            }
            Ok(CloseReason::Remote) => {
                info!("chat {chat_id} connection ended by server, reconnecting in {delay:?}");
                if send_presence(&frames, &chat_id, ConnectionState::Disconnected)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) if e.is_retryable() => {
                warn!("chat {chat_id} transport error: {e}, retrying in {delay:?}");
                if send_presence(&frames, &chat_id, ConnectionState::Error)
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                warn!("chat {chat_id} transport failed permanently: {e}");
                let _ = send_presence(&frames, &chat_id, ConnectionState::Error).await;
                return;
            }
        }
        if started.elapsed() >= STABLE_SESSION {
            delay = base;
        }
        tokio::time::sleep(delay).await;
        delay = next_delay(delay, cap);
    }
}

struct ChatLink {
    chat_id: String,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    tasks: Vec<AbortHandle>,
}

pub struct LinkSet {
    transport: Arc<dyn ChatTransport>,
    intents: std_mpsc::Sender<Intent>,
    /// Insertion order doubles as age for cap eviction.
    links: Vec<ChatLink>,
    max_links: usize,
    reconnect_base: Duration,
    reconnect_cap: Duration,
}

impl LinkSet {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        intents: std_mpsc::Sender<Intent>,
        max_links: usize,
        reconnect_base: Duration,
        reconnect_cap: Duration,
    ) -> Self {
        LinkSet {
            transport,
            intents,
            links: Vec::new(),
            max_links: max_links.max(1),
            reconnect_base,
            reconnect_cap,
        }
    }

    pub fn is_linked(&self, chat_id: &str) -> bool {
        self.links.iter().any(|l| l.chat_id == chat_id)
    }

    /// Opens a link for `chat_id`. Idempotent: an existing link (connected or
    /// mid-backoff) is left alone. When the cap is reached, the oldest link
    /// other than `keep` is evicted, or the oldest outright when every link
    /// is the kept chat. The cap is never exceeded.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self, chat_id: &str, keep: Option<&str>) {
        if self.is_linked(chat_id) {
            debug!("chat {chat_id} already linked");
            return;
        }
        if self.links.len() >= self.max_links {
            let victim = self
                .links
                .iter()
                .find(|l| Some(l.chat_id.as_str()) != keep)
                .or(self.links.first())
                .map(|l| l.chat_id.clone());
            if let Some(victim) = victim {
                info!("link cap reached, evicting oldest link (chat {victim})");
                self.disconnect(&victim);
            }
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (frame_tx, mut frame_rx) = mpsc::channel::<InboundFrame>(FRAME_BUFFER);

        let intents = self.intents.clone();
        let forward = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let intent = Intent::Frame {
                    frame,
                    now: Utc::now(),
                };
                if intents.send(intent).is_err() {
                    break;
                }
            }
        });

        let supervisor = tokio::spawn(supervise(
            Arc::clone(&self.transport),
            chat_id.to_string(),
            out_rx,
            frame_tx,
            self.reconnect_base,
            self.reconnect_cap,
        ));

        info!(
            "opened link for chat {chat_id} via {}",
            self.transport.name()
        );
        self.links.push(ChatLink {
            chat_id: chat_id.to_string(),
            outbound: out_tx,
            tasks: vec![supervisor.abort_handle(), forward.abort_handle()],
        });
    }

    /// Tears a link down immediately and reports the chat disconnected. Safe
    /// to call for chats that were never linked.
    pub fn disconnect(&mut self, chat_id: &str) {
        let Some(pos) = self.links.iter().position(|l| l.chat_id == chat_id) else {
            return;
        };
        let link = self.links.remove(pos);
        for task in &link.tasks {
            task.abort();
        }
        // The supervisor was aborted, so emit its terminal presence here.
        let _ = self.intents.send(Intent::Frame {
            frame: InboundFrame::Presence {
                chat_id: chat_id.to_string(),
                state: ConnectionState::Disconnected,
            },
            now: Utc::now(),
        });
        info!("closed link for chat {chat_id}");
    }

    /// Queues a frame on a chat's link. Frames queued while the link is still
    /// connecting (or mid-reconnect) are drained once the socket is up.
    /// Returns false when the chat has no link.
    pub fn deliver(&mut self, chat_id: &str, frame: OutboundFrame) -> bool {
        match self.links.iter().find(|l| l.chat_id == chat_id) {
            Some(link) => link.outbound.send(frame).is_ok(),
            None => false,
        }
    }

    pub fn shutdown(&mut self) {
        for link in self.links.drain(..) {
            for task in &link.tasks {
                task.abort();
            }
        }
    }
}

impl Drop for LinkSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::adapter::TransportError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Connects after `fail_first` rejected dials, then records every
    /// outbound frame until the link is dropped.
    struct ScriptedTransport {
        fail_first: AtomicUsize,
        seen: Mutex<Vec<OutboundFrame>>,
    }

    impl ScriptedTransport {
        fn new(fail_first: usize) -> Self {
            ScriptedTransport {
                fail_first: AtomicUsize::new(fail_first),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(
            &self,
            chat_id: &str,
            outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
            frames: mpsc::Sender<InboundFrame>,
        ) -> Result<CloseReason, TransportError> {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::Connect("scripted refusal".into()));
            }
            send_presence(&frames, chat_id, ConnectionState::Connected)
                .await
                .map_err(|_| TransportError::ChannelClosed)?;
            while let Some(frame) = outbound.recv().await {
                self.seen.lock().unwrap().push(frame);
            }
            Ok(CloseReason::Local)
        }
    }

    fn collect_presence(rx: &std_mpsc::Receiver<Intent>) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Ok(intent) = rx.try_recv() {
            if let Intent::Frame {
                frame: InboundFrame::Presence { state, .. },
                ..
            } = intent
            {
                states.push(state);
            }
        }
        states
    }

    async fn wait_until(mut probe: impl FnMut() -> bool) {
        for _ in 0..200 {
            if probe() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    #[test]
    fn test_next_delay_doubles_to_cap() {
        let cap = Duration::from_millis(8_000);
        let mut d = Duration::from_millis(500);
        let mut seen = vec![d];
        for _ in 0..5 {
            d = next_delay(d, cap);
            seen.push(d);
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1_000),
                Duration::from_millis(2_000),
                Duration::from_millis(4_000),
                Duration::from_millis(8_000),
                Duration::from_millis(8_000),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_is_idempotent_and_delivers() {
        let transport = Arc::new(ScriptedTransport::new(0));
        let (tx, rx) = std_mpsc::channel();
        let mut links = LinkSet::new(
            transport.clone(),
            tx,
            4,
            Duration::from_millis(10),
            Duration::from_millis(40),
        );

        links.connect("c1", None);
        links.connect("c1", None);
        assert_eq!(links.links.len(), 1);

        wait_until(|| collect_presence(&rx).contains(&ConnectionState::Connected)).await;

        assert!(links.deliver(
            "c1",
            OutboundFrame::TypingStart {
                chat_id: "c1".to_string()
            }
        ));
        assert!(!links.deliver(
            "nope",
            OutboundFrame::TypingStart {
                chat_id: "nope".to_string()
            }
        ));

        wait_until(|| !transport.seen.lock().unwrap().is_empty()).await;
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_with_backoff_until_success() {
        let transport = Arc::new(ScriptedTransport::new(2));
        let (tx, rx) = std_mpsc::channel();
        let mut links = LinkSet::new(
            transport,
            tx,
            4,
            Duration::from_millis(10),
            Duration::from_millis(40),
        );
        links.connect("c1", None);

        let mut states = Vec::new();
        wait_until(|| {
            states.extend(collect_presence(&rx));
            states.contains(&ConnectionState::Connected)
        })
        .await;

        // Two refused dials, then a live session.
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == ConnectionState::Error)
                .count(),
            2
        );
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == ConnectionState::Connecting)
                .count(),
            3
        );
        links.shutdown();
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest_but_keeps_active() {
        let transport = Arc::new(ScriptedTransport::new(0));
        let (tx, rx) = std_mpsc::channel();
        let mut links = LinkSet::new(
            transport,
            tx,
            2,
            Duration::from_millis(10),
            Duration::from_millis(40),
        );
        links.connect("c1", None);
        links.connect("c2", None);
        links.connect("c3", Some("c1"));

        assert!(links.is_linked("c1"), "active chat survives eviction");
        assert!(!links.is_linked("c2"));
        assert!(links.is_linked("c3"));

        // The evicted link reports itself disconnected.
        let disconnected: Vec<Intent> = rx.try_iter().collect();
        assert!(disconnected.iter().any(|i| matches!(
            i,
            Intent::Frame {
                frame: InboundFrame::Presence {
                    chat_id,
                    state: ConnectionState::Disconnected
                },
                ..
            } if chat_id == "c2"
        )));
    }

    #[tokio::test]
    async fn test_cap_of_one_replaces_kept_link() {
        let transport = Arc::new(ScriptedTransport::new(0));
        let (tx, _rx) = std_mpsc::channel();
        let mut links = LinkSet::new(
            transport,
            tx,
            1,
            Duration::from_millis(10),
            Duration::from_millis(40),
        );
        links.connect("c1", Some("c1"));
        // The only candidate is the kept chat itself; it gives way rather
        // than letting the set grow past the cap.
        links.connect("c2", Some("c1"));

        assert_eq!(links.links.len(), 1);
        assert!(!links.is_linked("c1"));
        assert!(links.is_linked("c2"));
    }

    #[tokio::test]
    async fn test_disconnect_unknown_chat_is_noop() {
        let transport = Arc::new(ScriptedTransport::new(0));
        let (tx, _rx) = std_mpsc::channel();
        let mut links = LinkSet::new(
            transport,
            tx,
            4,
            Duration::from_millis(10),
            Duration::from_millis(40),
        );
        links.disconnect("ghost");
        assert!(links.links.is_empty());
    }
}
