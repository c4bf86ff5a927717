//! # Intents & Updates
//!
//! Everything that can happen to the session becomes an `Intent`: user
//! actions from the surface, reconciliation results from REST calls, frames
//! from the realtime link, and clock ticks. `update()` is the only place
//! state changes, and the `Effect`s it returns are the only way work leaves
//! the store:
//!
//! ```text
//! ChatStore + Intent → update() → Vec<Effect>
//! ```
//!
//! The runtime executes effects (HTTP calls, link management, frame
//! delivery) and feeds the outcomes back in as new intents, so every arm
//! here is a pure function of store and intent. Time never comes from the
//! wall clock: intents that need it carry `now`, which is what makes the
//! optimistic pipeline testable under a virtual clock.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::core::model::{Chat, ConnectionState, Message, MessageStatus};
use crate::core::state::{ChatStore, MergeSource, PendingSend};
use crate::transport::frame::{InboundFrame, OutboundFrame};

/// Title given to optimistically created chats until the user renames one.
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

/// Every event the session reducer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    // ------------------------------------------------------------------
    // Surface-driven
    // ------------------------------------------------------------------
    LoadChats,
    CreateChat {
        assistant_id: String,
        now: DateTime<Utc>,
    },
    SelectChat {
        chat_id: String,
    },
    SendMessage {
        chat_id: String,
        content: String,
        now: DateTime<Utc>,
    },
    /// Re-sends a failed message as a brand-new send.
    RetryMessage {
        chat_id: String,
        message_id: String,
        now: DateTime<Utc>,
    },
    DeleteChat {
        chat_id: String,
    },
    DismissError,
    /// Periodic sweep: typing expiry, send timeouts, error auto-clear.
    Tick {
        now: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // Realtime ingestion (single entry point for all frames)
    // ------------------------------------------------------------------
    Frame {
        frame: InboundFrame,
        now: DateTime<Utc>,
    },

    // ------------------------------------------------------------------
    // REST reconciliation
    // ------------------------------------------------------------------
    ChatsLoaded {
        chats: Vec<Chat>,
    },
    ChatsLoadFailed {
        reason: String,
        now: DateTime<Utc>,
    },
    ChatCreated {
        local_id: String,
        chat: Chat,
        now: DateTime<Utc>,
    },
    ChatCreateFailed {
        local_id: String,
        reason: String,
        now: DateTime<Utc>,
    },
    ChatDeleted {
        chat_id: String,
    },
    ChatDeleteFailed {
        chat_id: String,
        reason: String,
        now: DateTime<Utc>,
    },
    MessagesLoaded {
        chat_id: String,
        messages: Vec<Message>,
    },
    MessagesLoadFailed {
        chat_id: String,
        reason: String,
        now: DateTime<Utc>,
    },
    SendFailed {
        chat_id: String,
        message_id: String,
        reason: String,
    },
}

/// Work the runtime performs on the store's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// GET /chats
    FetchChats,
    /// POST /chats; reconciled via `ChatCreated` / `ChatCreateFailed`.
    PostChat {
        local_id: String,
        title: String,
        assistant_id: String,
    },
    /// DELETE /chats/{id}
    DeleteChatRemote { chat_id: String },
    /// GET /chats/{id}/messages
    FetchMessages { chat_id: String },
    /// Open (or keep) the chat's realtime link.
    Connect { chat_id: String },
    /// Tear the chat's realtime link down.
    Disconnect { chat_id: String },
    /// Queue a frame on the chat's link.
    Deliver {
        chat_id: String,
        frame: OutboundFrame,
    },
    /// Fire-and-forget notification outside the chat surface.
    Toast { message: String },
}

/// Records a user-visible error and pairs it with a toast.
fn fail(store: &mut ChatStore, message: String, now: DateTime<Utc>) -> Vec<Effect> {
    store.record_error(message.clone(), now);
    vec![Effect::Toast { message }]
}

/// The reducer. Applies one intent to the store and returns the effects the
/// runtime must perform, in order.
pub fn update(store: &mut ChatStore, intent: Intent) -> Vec<Effect> {
    match intent {
        // ------------------------------------------------------------------
        // Chat list
        // ------------------------------------------------------------------
        Intent::LoadChats => {
            debug!("requesting chat list");
            vec![Effect::FetchChats]
        }

        Intent::ChatsLoaded { chats } => {
            info!("loaded {} chats", chats.len());
            let dropped = store.merge_chats(chats);
            dropped
                .into_iter()
                .map(|chat_id| Effect::Disconnect { chat_id })
                .collect()
        }

        Intent::ChatsLoadFailed { reason, now } => {
            warn!("chat list load failed: {reason}");
            fail(store, format!("Couldn't load chats: {reason}"), now)
        }

        // ------------------------------------------------------------------
        // Chat creation
        // ------------------------------------------------------------------
        Intent::CreateChat { assistant_id, now } => {
            let assistant_id = assistant_id.trim().to_string();
            if assistant_id.is_empty() {
                debug!("ignoring create with empty assistant reference");
                return Vec::new();
            }
            let draft = Chat::draft(DEFAULT_CHAT_TITLE, &assistant_id, now);
            let local_id = draft.id.clone();
            let title = draft.title.clone();
            info!("creating chat optimistically as {local_id}");
            store.chats.push(draft);
            store.session_entry(&local_id);
            vec![Effect::PostChat {
                local_id,
                title,
                assistant_id,
            }]
        }

        Intent::ChatCreated {
            local_id,
            chat,
            now,
        } => {
            let server_id = chat.id.clone();
            match store.confirm_chat(&local_id, chat) {
                Some(held) => {
                    info!("chat {local_id} confirmed as {server_id}");
                    let mut effects = Vec::new();
                    let active = store.active_chat.as_deref() == Some(server_id.as_str());
                    // Parked sends need a live link even if the user has
                    // already switched away.
                    if active || !held.is_empty() {
                        effects.push(Effect::Connect {
                            chat_id: server_id.clone(),
                        });
                    }
                    let mut parked: Vec<(String, String)> = Vec::new();
                    {
                        let session = store.session_entry(&server_id);
                        for id in &held {
                            if let Some(m) = session.messages.iter().find(|m| &m.id == id) {
                                parked.push((id.clone(), m.content.clone()));
                            }
                        }
                        for (id, _) in &parked {
                            session.in_flight.push(PendingSend {
                                message_id: id.clone(),
                                sent_at: now,
                            });
                        }
                    }
                    for (client_id, content) in parked {
                        effects.push(Effect::Deliver {
                            chat_id: server_id.clone(),
                            frame: OutboundFrame::SendMessage {
                                chat_id: server_id.clone(),
                                content,
                                client_id,
                            },
                        });
                    }
                    effects
                }
                // The draft was deleted before the server answered; the
                // confirmed chat is an orphan now, clean it up remotely.
                None => {
                    info!("draft {local_id} gone, deleting orphan chat {server_id}");
                    vec![Effect::DeleteChatRemote { chat_id: server_id }]
                }
            }
        }

        Intent::ChatCreateFailed {
            local_id,
            reason,
            now,
        } => {
            warn!("chat creation failed for draft {local_id}: {reason}");
            store.remove_chat(&local_id);
            fail(store, format!("Couldn't create chat: {reason}"), now)
        }

        // ------------------------------------------------------------------
        // Selection & history
        // ------------------------------------------------------------------
        Intent::SelectChat { chat_id } => {
            let Some(chat) = store.chat(&chat_id) else {
                warn!("select of unknown chat {chat_id}");
                return Vec::new();
            };
            let pending = chat.pending;
            debug!("selecting chat {chat_id}");
            store.active_chat = Some(chat_id.clone());
            if pending {
                // No server identity yet: nothing to connect or fetch.
                return Vec::new();
            }
            let mut effects = Vec::new();
            let session = store.session_entry(&chat_id);
            if matches!(
                session.connection,
                ConnectionState::Disconnected | ConnectionState::Error
            ) {
                effects.push(Effect::Connect {
                    chat_id: chat_id.clone(),
                });
            }
            if !session.history_loaded && !session.history_requested {
                session.history_requested = true;
                effects.push(Effect::FetchMessages { chat_id });
            }
            effects
        }

        Intent::MessagesLoaded { chat_id, messages } => {
            let count = messages.len();
            {
                let session = store.session_entry(&chat_id);
                session.history_loaded = true;
                session.history_requested = false;
            }
            for message in messages {
                store.apply_message(message, MergeSource::History);
            }
            info!("merged {count} history messages into chat {chat_id}");
            Vec::new()
        }

        Intent::MessagesLoadFailed {
            chat_id,
            reason,
            now,
        } => {
            warn!("history load failed for chat {chat_id}: {reason}");
            if let Some(session) = store.sessions.get_mut(&chat_id) {
                session.history_requested = false;
            }
            fail(store, format!("Couldn't load messages: {reason}"), now)
        }

        // ------------------------------------------------------------------
        // Sending
        // ------------------------------------------------------------------
        Intent::SendMessage {
            chat_id,
            content,
            now,
        } => {
            let content = content.trim().to_string();
            if content.is_empty() {
                debug!("ignoring empty send");
                return Vec::new();
            }
            let Some(chat) = store.chat(&chat_id) else {
                warn!("send for unknown chat {chat_id}");
                return Vec::new();
            };
            let draft_chat = chat.pending;
            if !draft_chat && store.connection(&chat_id) != ConnectionState::Connected {
                warn!("send while chat {chat_id} is not connected; dropped");
                return Vec::new();
            }

            let message = Message::outgoing(&chat_id, content, now);
            let message_id = message.id.clone();
            let frame = OutboundFrame::SendMessage {
                chat_id: chat_id.clone(),
                content: message.content.clone(),
                client_id: message_id.clone(),
            };
            store.apply_message(message, MergeSource::Local);

            let session = store.session_entry(&chat_id);
            if draft_chat {
                // The chat id is provisional; park the send until the server
                // confirms the chat and the frame can carry a real id.
                debug!("parked send {message_id} for unconfirmed chat {chat_id}");
                session.held.push(message_id);
                Vec::new()
            } else {
                session.in_flight.push(PendingSend {
                    message_id,
                    sent_at: now,
                });
                vec![Effect::Deliver { chat_id, frame }]
            }
        }

        Intent::RetryMessage {
            chat_id,
            message_id,
            now,
        } => {
            if store.connection(&chat_id) != ConnectionState::Connected {
                warn!("retry while chat {chat_id} is not connected; ignored");
                return Vec::new();
            }
            let content = {
                let Some(session) = store.sessions.get_mut(&chat_id) else {
                    warn!("retry for unknown chat {chat_id}");
                    return Vec::new();
                };
                let Some(pos) = session.messages.iter().position(|m| m.id == message_id) else {
                    warn!("retry for unknown message {message_id}");
                    return Vec::new();
                };
                if session.messages[pos].status != MessageStatus::Failed {
                    warn!("retry for message {message_id} that has not failed; ignored");
                    return Vec::new();
                }
                session.messages.remove(pos).content
            };
            // The failed entry is replaced, not revived: same content, fresh
            // id, fresh position at the tail.
            if let Some(chat) = store.chat_mut(&chat_id) {
                chat.message_count = chat.message_count.saturating_sub(1);
            }
            let message = Message::outgoing(&chat_id, content.clone(), now);
            let new_id = message.id.clone();
            info!("retrying failed message {message_id} as {new_id}");
            store.apply_message(message, MergeSource::Local);
            store.session_entry(&chat_id).in_flight.push(PendingSend {
                message_id: new_id.clone(),
                sent_at: now,
            });
            vec![Effect::Deliver {
                chat_id: chat_id.clone(),
                frame: OutboundFrame::SendMessage {
                    chat_id,
                    content,
                    client_id: new_id,
                },
            }]
        }

        Intent::SendFailed {
            chat_id,
            message_id,
            reason,
        } => {
            warn!("send {message_id} in chat {chat_id} failed: {reason}");
            if let Some(session) = store.sessions.get_mut(&chat_id) {
                session.in_flight.retain(|p| p.message_id != message_id);
                if let Some(message) = session.messages.iter_mut().find(|m| m.id == message_id) {
                    message.status = message.status.advance(MessageStatus::Failed);
                }
            }
            Vec::new()
        }

        // ------------------------------------------------------------------
        // Deletion
        // ------------------------------------------------------------------
        Intent::DeleteChat { chat_id } => {
            let Some(chat) = store.chat(&chat_id) else {
                warn!("delete of unknown chat {chat_id}");
                return Vec::new();
            };
            if chat.pending {
                // Purely local: the server never saw this draft. A late
                // creation ack cleans the orphan up in ChatCreated.
                info!("discarding unconfirmed draft {chat_id}");
                store.remove_chat(&chat_id);
                return Vec::new();
            }
            info!("deleting chat {chat_id} optimistically");
            store.stash_delete(&chat_id);
            vec![
                Effect::Disconnect {
                    chat_id: chat_id.clone(),
                },
                Effect::DeleteChatRemote { chat_id },
            ]
        }

        Intent::ChatDeleted { chat_id } => {
            debug!("chat {chat_id} deletion confirmed");
            store.discard_delete(&chat_id);
            Vec::new()
        }

        Intent::ChatDeleteFailed {
            chat_id,
            reason,
            now,
        } => {
            warn!("chat {chat_id} deletion failed: {reason}");
            match store.restore_delete(&chat_id) {
                Some(was_active) => {
                    let mut effects = Vec::new();
                    if was_active {
                        effects.push(Effect::Connect {
                            chat_id: chat_id.clone(),
                        });
                    }
                    effects.extend(fail(
                        store,
                        format!("Couldn't delete chat: {reason}"),
                        now,
                    ));
                    effects
                }
                // Orphan cleanup from ChatCreated has no stash; nothing to
                // put back and nothing the user needs to see.
                None => {
                    debug!("no stashed chat {chat_id} to restore");
                    Vec::new()
                }
            }
        }

        // ------------------------------------------------------------------
        // Realtime frames & time
        // ------------------------------------------------------------------
        Intent::Frame { frame, now } => apply_frame(store, frame, now),

        Intent::Tick { now } => {
            store.expire_typing(now);
            for (chat_id, message_id) in store.timeout_sends(now) {
                warn!("send {message_id} in chat {chat_id} timed out");
            }
            store.clear_stale_error(now);
            Vec::new()
        }

        Intent::DismissError => {
            store.last_error = None;
            Vec::new()
        }
    }
}

/// Applies one inbound frame. Frames for chats the store does not know are
/// dropped with a log line; a surprising frame must never corrupt state.
fn apply_frame(store: &mut ChatStore, frame: InboundFrame, now: DateTime<Utc>) -> Vec<Effect> {
    match frame {
        InboundFrame::MessageCreated { message } | InboundFrame::MessageUpdated { message } => {
            let incoming: Message = message.into();
            if store.chat(&incoming.chat_id).is_none() {
                warn!("message frame for unknown chat {}; dropped", incoming.chat_id);
                return Vec::new();
            }
            let arrival = store.apply_message(incoming, MergeSource::Realtime);
            debug!("message frame applied: {arrival:?}");
            Vec::new()
        }
        InboundFrame::TypingStart {
            chat_id,
            user_id,
            assistant,
        } => {
            if store.chat(&chat_id).is_none() {
                debug!("typing frame for unknown chat {chat_id}; dropped");
                return Vec::new();
            }
            store.note_typing(&chat_id, &user_id, assistant, now);
            Vec::new()
        }
        InboundFrame::TypingStop { chat_id, user_id } => {
            store.clear_typing(&chat_id, &user_id);
            Vec::new()
        }
        InboundFrame::Presence { chat_id, state } => {
            if store.chat(&chat_id).is_none() {
                debug!("presence for unknown chat {chat_id}; dropped");
                return Vec::new();
            }
            debug!("chat {chat_id} connection: {state:?}");
            store.session_entry(&chat_id).connection = state;
            Vec::new()
        }
        InboundFrame::Error { chat_id, message } => {
            let text = match chat_id {
                Some(id) => format!("{message} (chat {id})"),
                None => message,
            };
            store.record_error(text, now);
            Vec::new()
        }
        InboundFrame::Unknown => {
            debug!("ignoring unknown frame kind");
            Vec::new()
        }
    }
}
