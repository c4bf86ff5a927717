//! # Session Runtime
//!
//! The shell around the pure core. `SessionRuntime` owns the `ChatStore`,
//! performs the effects `update()` returns, and funnels every background
//! result back through a single intent channel:
//!
//! - REST effects become tokio tasks that call `ChatApi` and post the
//!   outcome as a reconciliation intent,
//! - link effects go to the `LinkSet`, whose tasks post inbound frames as
//!   `Intent::Frame`,
//! - toasts queue here until the surface collects them.
//!
//! The embedding surface drives the runtime from its own loop: dispatch
//! intents on input, call `pump()` once per frame to drain background
//! results, and dispatch `Intent::Tick` on a timer for the time-based
//! sweeps.

use std::sync::mpsc;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use crate::api::client::ChatApi;
use crate::api::types::CreateChatRequest;
use crate::core::config::{FeatureFlags, ResolvedConfig};
use crate::core::intent::{update, Effect, Intent};
use crate::core::model::{Chat, Message};
use crate::core::state::ChatStore;
use crate::transport::adapter::ChatTransport;
use crate::transport::frame::OutboundFrame;
use crate::transport::link::LinkSet;
use crate::view::composer::TypingSignal;

pub struct SessionRuntime {
    /// The single source of truth the surface renders from.
    pub store: ChatStore,
    api: Arc<ChatApi>,
    links: LinkSet,
    features: FeatureFlags,
    tx: mpsc::Sender<Intent>,
    rx: mpsc::Receiver<Intent>,
    toasts: Vec<String>,
}

impl SessionRuntime {
    /// Builds a runtime from resolved configuration and a transport.
    ///
    /// Must be called from within a tokio runtime: link and REST effects
    /// spawn tasks on the ambient runtime.
    pub fn new(config: &ResolvedConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let (tx, rx) = mpsc::channel();
        let links = LinkSet::new(
            transport,
            tx.clone(),
            config.max_links,
            config.reconnect_base,
            config.reconnect_cap,
        );
        SessionRuntime {
            store: ChatStore::new(config.timing),
            api: Arc::new(ChatApi::new(
                config.rest_url.clone(),
                config.api_token.clone(),
            )),
            links,
            features: config.features,
            tx,
            rx,
            toasts: Vec::new(),
        }
    }

    /// Capability switches for the embedding surface.
    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    /// A handle for posting intents from outside the runtime (timers, other
    /// threads). Posted intents are applied on the next `pump()`.
    pub fn intent_sender(&self) -> mpsc::Sender<Intent> {
        self.tx.clone()
    }

    /// Applies one intent to the store and performs the effects it returns,
    /// in order.
    pub fn dispatch(&mut self, intent: Intent) {
        debug!("dispatch: {intent:?}");
        for effect in update(&mut self.store, intent) {
            self.perform(effect);
        }
    }

    /// Drains intents posted by background tasks (REST results, inbound
    /// frames) and applies them. Returns how many were applied. Call once
    /// per surface frame.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(intent) = self.rx.try_recv() {
            self.dispatch(intent);
            applied += 1;
        }
        applied
    }

    /// Forwards a composer typing signal to the chat's link. Typing is
    /// best-effort: signals for unlinked chats are dropped.
    pub fn send_typing(&mut self, chat_id: &str, signal: TypingSignal) {
        let frame = match signal {
            TypingSignal::Start => OutboundFrame::TypingStart {
                chat_id: chat_id.to_string(),
            },
            TypingSignal::Stop => OutboundFrame::TypingStop {
                chat_id: chat_id.to_string(),
            },
        };
        if !self.links.deliver(chat_id, frame) {
            debug!("chat {chat_id} has no link, dropping typing signal");
        }
    }

    /// Hands queued toasts to the surface, clearing the queue.
    pub fn take_toasts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.toasts)
    }

    /// Tears down every link. Also runs on drop via `LinkSet`.
    pub fn shutdown(&mut self) {
        self.links.shutdown();
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::FetchChats => spawn_fetch_chats(Arc::clone(&self.api), self.tx.clone()),
            Effect::PostChat {
                local_id,
                title,
                assistant_id,
            } => spawn_create_chat(
                Arc::clone(&self.api),
                self.tx.clone(),
                local_id,
                title,
                assistant_id,
            ),
            Effect::DeleteChatRemote { chat_id } => {
                spawn_delete_chat(Arc::clone(&self.api), self.tx.clone(), chat_id)
            }
            Effect::FetchMessages { chat_id } => {
                spawn_fetch_messages(Arc::clone(&self.api), self.tx.clone(), chat_id)
            }
            Effect::Connect { chat_id } => self
                .links
                .connect(&chat_id, self.store.active_chat.as_deref()),
            Effect::Disconnect { chat_id } => self.links.disconnect(&chat_id),
            Effect::Deliver { chat_id, frame } => self.deliver(chat_id, frame),
            Effect::Toast { message } => {
                info!("toast: {message}");
                self.toasts.push(message);
            }
        }
    }

    /// Queues a frame on the chat's link. A send that cannot even be queued
    /// fails immediately instead of waiting out the ack timeout.
    fn deliver(&mut self, chat_id: String, frame: OutboundFrame) {
        let client_id = match &frame {
            OutboundFrame::SendMessage { client_id, .. } => Some(client_id.clone()),
            _ => None,
        };
        if self.links.deliver(&chat_id, frame) {
            return;
        }
        match client_id {
            Some(message_id) => {
                warn!("chat {chat_id} has no link, failing send {message_id}");
                self.dispatch(Intent::SendFailed {
                    chat_id,
                    message_id,
                    reason: "not connected".to_string(),
                });
            }
            None => debug!("chat {chat_id} has no link, dropping typing signal"),
        }
    }
}

fn spawn_fetch_chats(api: Arc<ChatApi>, tx: mpsc::Sender<Intent>) {
    info!("spawning chat list fetch");
    tokio::spawn(async move {
        let intent = match api.list_chats().await {
            Ok(dtos) => Intent::ChatsLoaded {
                chats: dtos.into_iter().map(Chat::from).collect(),
            },
            Err(e) => Intent::ChatsLoadFailed {
                reason: e.to_string(),
                now: Utc::now(),
            },
        };
        if tx.send(intent).is_err() {
            warn!("chat list result dropped: receiver gone");
        }
    });
}

fn spawn_create_chat(
    api: Arc<ChatApi>,
    tx: mpsc::Sender<Intent>,
    local_id: String,
    title: String,
    assistant_id: String,
) {
    info!("spawning chat create for draft {local_id}");
    tokio::spawn(async move {
        let request = CreateChatRequest {
            title,
            assistant_id,
        };
        let intent = match api.create_chat(&request).await {
            Ok(dto) => Intent::ChatCreated {
                local_id,
                chat: dto.into(),
                now: Utc::now(),
            },
            Err(e) => Intent::ChatCreateFailed {
                local_id,
                reason: e.to_string(),
                now: Utc::now(),
            },
        };
        if tx.send(intent).is_err() {
            warn!("chat create result dropped: receiver gone");
        }
    });
}

fn spawn_delete_chat(api: Arc<ChatApi>, tx: mpsc::Sender<Intent>, chat_id: String) {
    info!("spawning chat delete for {chat_id}");
    tokio::spawn(async move {
        let intent = match api.delete_chat(&chat_id).await {
            Ok(()) => Intent::ChatDeleted { chat_id },
            Err(e) => Intent::ChatDeleteFailed {
                chat_id,
                reason: e.to_string(),
                now: Utc::now(),
            },
        };
        if tx.send(intent).is_err() {
            warn!("chat delete result dropped: receiver gone");
        }
    });
}

fn spawn_fetch_messages(api: Arc<ChatApi>, tx: mpsc::Sender<Intent>, chat_id: String) {
    info!("spawning history fetch for chat {chat_id}");
    tokio::spawn(async move {
        let intent = match api.list_messages(&chat_id).await {
            Ok(dtos) => Intent::MessagesLoaded {
                chat_id,
                messages: dtos.into_iter().map(Message::from).collect(),
            },
            Err(e) => Intent::MessagesLoadFailed {
                chat_id,
                reason: e.to_string(),
                now: Utc::now(),
            },
        };
        if tx.send(intent).is_err() {
            warn!("history result dropped: receiver gone");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ChatKind, ConnectionState, MessageStatus};
    use crate::test_support::{test_config, FakeTransport};
    use crate::transport::frame::InboundFrame;
    use chrono::TimeZone;
    use std::time::Duration;

    fn listed_chat(id: &str) -> Chat {
        Chat {
            id: id.to_string(),
            title: "Support".to_string(),
            description: None,
            kind: ChatKind::Direct,
            assistant_id: Some("asst-1".to_string()),
            ai_model: None,
            message_count: 0,
            last_activity: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            pending: false,
        }
    }

    #[test]
    fn test_pump_applies_queued_intents() {
        let mut runtime = SessionRuntime::new(&test_config(), Arc::new(FakeTransport::new()));
        let sender = runtime.intent_sender();
        sender.send(Intent::Tick { now: Utc::now() }).unwrap();
        sender.send(Intent::DismissError).unwrap();

        assert_eq!(runtime.pump(), 2);
        assert_eq!(runtime.pump(), 0);
    }

    #[test]
    fn test_toasts_queue_until_collected() {
        let mut runtime = SessionRuntime::new(&test_config(), Arc::new(FakeTransport::new()));
        runtime.dispatch(Intent::ChatsLoadFailed {
            reason: "boom".to_string(),
            now: Utc::now(),
        });

        assert!(runtime.store.last_error.is_some());
        assert_eq!(runtime.take_toasts(), vec!["Couldn't load chats: boom"]);
        assert!(runtime.take_toasts().is_empty());
    }

    /// A session can claim to be connected while the link set has no link
    /// for it (stale state after an eviction). The send must fail right
    /// away, not sit in Sending until the ack timeout.
    #[test]
    fn test_unlinked_send_fails_immediately() {
        let mut runtime = SessionRuntime::new(&test_config(), Arc::new(FakeTransport::new()));
        runtime.dispatch(Intent::ChatsLoaded {
            chats: vec![listed_chat("c1")],
        });
        runtime.dispatch(Intent::Frame {
            frame: InboundFrame::Presence {
                chat_id: "c1".to_string(),
                state: ConnectionState::Connected,
            },
            now: Utc::now(),
        });

        runtime.dispatch(Intent::SendMessage {
            chat_id: "c1".to_string(),
            content: "hello".to_string(),
            now: Utc::now(),
        });

        let messages = runtime.store.messages("c1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Failed);
        assert!(runtime
            .store
            .session("c1")
            .unwrap()
            .in_flight
            .is_empty());
    }

    #[tokio::test]
    async fn test_select_links_chat_and_typing_flows() {
        let transport = Arc::new(FakeTransport::new());
        let mut runtime = SessionRuntime::new(&test_config(), transport.clone());

        runtime.dispatch(Intent::ChatsLoaded {
            chats: vec![listed_chat("c1")],
        });
        // History pre-loaded so selection opens a link without a REST fetch.
        runtime.dispatch(Intent::MessagesLoaded {
            chat_id: "c1".to_string(),
            messages: Vec::new(),
        });
        runtime.dispatch(Intent::SelectChat {
            chat_id: "c1".to_string(),
        });

        for _ in 0..200 {
            runtime.pump();
            if runtime.store.connection("c1") == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runtime.store.connection("c1"), ConnectionState::Connected);

        runtime.send_typing("c1", TypingSignal::Start);
        runtime.send_typing("c1", TypingSignal::Stop);
        // Unlinked chats swallow typing quietly.
        runtime.send_typing("ghost", TypingSignal::Start);

        for _ in 0..200 {
            if transport.sent_for("c1").len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            transport.sent_for("c1"),
            vec![
                OutboundFrame::TypingStart {
                    chat_id: "c1".to_string()
                },
                OutboundFrame::TypingStop {
                    chat_id: "c1".to_string()
                },
            ]
        );
        assert!(transport.sent_for("ghost").is_empty());
        runtime.shutdown();
    }
}
