//! # Session State
//!
//! `ChatStore` is the single state container for everything the chat surface
//! renders. Nothing outside `core::update` mutates it; collaborators read it
//! through accessors and react to the intents they dispatch.
//!
//! ```text
//! ChatStore
//! ├── chats: Vec<Chat>               // list order: server order, drafts at tail
//! ├── active_chat: Option<String>
//! ├── sessions: chat id -> ChatSession
//! │   ├── messages: Vec<Message>     // ordered, never reordered in place
//! │   ├── connection: ConnectionState
//! │   ├── typing: Vec<TypingUser>
//! │   ├── in_flight: Vec<PendingSend>  // FIFO, oldest ack candidate first
//! │   └── held: Vec<String>            // sends parked until the chat id is real
//! ├── last_error: Option<LastError>
//! └── deleted: stash for optimistic delete rollback
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::warn;

use crate::core::config::TimingConfig;
use crate::core::model::{
    insert_position, Chat, ConnectionState, Message, MessageStatus, SenderRole, TypingUser,
};

/// A user-visible error banner. Cleared by dismissal or after
/// `TimingConfig::error_display` has elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One message handed to the transport and not yet acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub message_id: String,
    pub sent_at: DateTime<Utc>,
}

/// Per-chat state. Created lazily the first time a chat is touched.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub messages: Vec<Message>,
    pub connection: ConnectionState,
    pub typing: Vec<TypingUser>,
    /// True once message history has been merged, even if it was empty.
    pub history_loaded: bool,
    /// True while a history fetch is outstanding; reset on failure so the
    /// next selection retries.
    pub history_requested: bool,
    pub in_flight: Vec<PendingSend>,
    pub held: Vec<String>,
}

/// Everything needed to undo an optimistic chat deletion.
#[derive(Debug, Clone)]
pub(crate) struct DeletedChat {
    chat: Chat,
    session: ChatSession,
    index: usize,
    was_active: bool,
}

/// How `apply_message` disposed of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageArrival {
    /// New entry inserted at its ordered position.
    Inserted,
    /// Known id, merged into the existing entry in place.
    Merged,
    /// Unknown id claimed by the oldest in-flight optimistic send.
    Adopted,
}

/// Where a message entering `apply_message` came from. The source decides
/// whether unknown ids may claim in-flight sends and whether chat list
/// metadata moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeSource {
    /// A frame off the link. May adopt the oldest in-flight send and bumps
    /// chat metadata on insert.
    Realtime,
    /// Fetched history. Never adopts; the chat's server-supplied counters
    /// already include these messages, so they stay untouched.
    History,
    /// An optimistic send of our own. Counts and bumps activity, but must
    /// not be mistaken for an ack of an earlier send.
    Local,
}

#[derive(Debug)]
pub struct ChatStore {
    pub chats: Vec<Chat>,
    pub active_chat: Option<String>,
    pub sessions: HashMap<String, ChatSession>,
    pub last_error: Option<LastError>,
    pub timing: TimingConfig,
    pub(crate) deleted: HashMap<String, DeletedChat>,
}

impl ChatStore {
    pub fn new(timing: TimingConfig) -> Self {
        ChatStore {
            chats: Vec::new(),
            active_chat: None,
            sessions: HashMap::new(),
            last_error: None,
            timing,
            deleted: HashMap::new(),
        }
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub(crate) fn chat_mut(&mut self, chat_id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == chat_id)
    }

    pub fn session(&self, chat_id: &str) -> Option<&ChatSession> {
        self.sessions.get(chat_id)
    }

    pub fn messages(&self, chat_id: &str) -> &[Message] {
        self.sessions
            .get(chat_id)
            .map(|s| s.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn connection(&self, chat_id: &str) -> ConnectionState {
        self.sessions
            .get(chat_id)
            .map(|s| s.connection)
            .unwrap_or_default()
    }

    pub fn typing_users(&self, chat_id: &str) -> &[TypingUser] {
        self.sessions
            .get(chat_id)
            .map(|s| s.typing.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn session_entry(&mut self, chat_id: &str) -> &mut ChatSession {
        self.sessions.entry(chat_id.to_string()).or_default()
    }

    // ========================================================================
    // Message pipeline
    // ========================================================================

    /// Folds a message into its session.
    ///
    /// Known ids merge in place. Unknown ids either claim the oldest
    /// in-flight optimistic send (realtime frames only, where arrival order
    /// matches server order) or insert as a new entry: local sends at the
    /// tail, server-stamped arrivals at their ordered position.
    pub(crate) fn apply_message(
        &mut self,
        incoming: Message,
        source: MergeSource,
    ) -> MessageArrival {
        let chat_id = incoming.chat_id.clone();
        let arrival = {
            let session = self.session_entry(&chat_id);

            if let Some(existing) = session.messages.iter_mut().find(|m| m.id == incoming.id) {
                existing.merge_inbound(&incoming);
                let settled = existing.status != MessageStatus::Sending;
                if settled {
                    session.in_flight.retain(|p| p.message_id != incoming.id);
                }
                MessageArrival::Merged
            } else if source == MergeSource::Realtime
                && incoming.sender == SenderRole::User
                && !session.in_flight.is_empty()
            {
                // The server echoes our sends in the order we delivered them,
                // so the oldest unacked send is the one this frame confirms.
                let pending_id = session.in_flight.remove(0).message_id;
                match session.messages.iter_mut().find(|m| m.id == pending_id) {
                    Some(ours) => {
                        ours.id = incoming.id.clone();
                        ours.merge_inbound(&incoming);
                        MessageArrival::Adopted
                    }
                    None => {
                        warn!(
                            "in-flight entry {pending_id} has no message; inserting frame as new"
                        );
                        let pos = insert_position(&session.messages, &incoming);
                        session.messages.insert(pos, incoming.clone());
                        MessageArrival::Inserted
                    }
                }
            } else {
                // A local send takes the tail; ordered insertion is for
                // server-stamped arrivals.
                let pos = match source {
                    MergeSource::Local => session.messages.len(),
                    _ => insert_position(&session.messages, &incoming),
                };
                session.messages.insert(pos, incoming.clone());
                MessageArrival::Inserted
            }
        };

        if source != MergeSource::History
            && let Some(chat) = self.chat_mut(&chat_id)
        {
            if arrival == MessageArrival::Inserted {
                chat.message_count += 1;
            }
            if incoming.timestamp > chat.last_activity {
                chat.last_activity = incoming.timestamp;
            }
        }
        arrival
    }

    // ========================================================================
    // Chat list reconciliation
    // ========================================================================

    /// Replaces the chat list with a fresh server listing, keeping local
    /// drafts at the tail. Returns the ids of chats the server no longer
    /// lists so their links can be torn down.
    pub(crate) fn merge_chats(&mut self, listed: Vec<Chat>) -> Vec<String> {
        let mut merged = listed;
        // A chat we are optimistically deleting may still appear in a listing
        // that raced the DELETE call; re-adding it would undo the removal.
        merged.retain(|c| !self.deleted.contains_key(&c.id));
        for chat in self.chats.drain(..) {
            if chat.pending && !merged.iter().any(|c| c.id == chat.id) {
                merged.push(chat);
            }
        }
        self.chats = merged;

        let known: HashSet<&str> = self.chats.iter().map(|c| c.id.as_str()).collect();
        let dropped: Vec<String> = self
            .sessions
            .keys()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &dropped {
            self.sessions.remove(id);
        }
        if let Some(active) = &self.active_chat
            && !known.contains(active.as_str())
        {
            self.active_chat = None;
        }
        dropped
    }

    /// Atomically rebinds a draft chat to its server-confirmed identity:
    /// chat entry, session key, message chat ids, and the active pointer all
    /// move in one step. Returns the parked send ids that can now be
    /// delivered, or `None` if the draft is gone (rolled back or deleted).
    pub(crate) fn confirm_chat(&mut self, local_id: &str, confirmed: Chat) -> Option<Vec<String>> {
        let index = self.chats.iter().position(|c| c.id == local_id)?;
        let mut session = self.sessions.remove(local_id).unwrap_or_default();
        let server_id = confirmed.id.clone();
        for message in &mut session.messages {
            message.chat_id = server_id.clone();
        }
        let held: Vec<String> = session.held.drain(..).collect();

        let mut chat = confirmed;
        chat.pending = false;
        chat.message_count = chat.message_count.max(session.messages.len() as u64);
        if let Some(last) = session.messages.last() {
            chat.last_activity = chat.last_activity.max(last.timestamp);
        }
        // A chat created this instant has no server history to fetch.
        session.history_loaded = true;
        session.history_requested = false;

        self.sessions.insert(server_id.clone(), session);
        self.chats[index] = chat;
        if self.active_chat.as_deref() == Some(local_id) {
            self.active_chat = Some(server_id);
        }
        Some(held)
    }

    /// Drops a chat without stashing anything. Used to roll back a failed
    /// optimistic create, where there is nothing on the server to restore.
    pub(crate) fn remove_chat(&mut self, chat_id: &str) {
        self.chats.retain(|c| c.id != chat_id);
        self.sessions.remove(chat_id);
        if self.active_chat.as_deref() == Some(chat_id) {
            self.active_chat = None;
        }
    }

    // ========================================================================
    // Optimistic deletion
    // ========================================================================

    /// Removes a chat from view, stashing everything needed to restore it if
    /// the server rejects the deletion. Returns whether it was active.
    pub(crate) fn stash_delete(&mut self, chat_id: &str) -> Option<bool> {
        let index = self.chats.iter().position(|c| c.id == chat_id)?;
        let chat = self.chats.remove(index);
        let mut session = self.sessions.remove(chat_id).unwrap_or_default();
        // The link is torn down with the chat; a restore starts disconnected.
        session.connection = ConnectionState::Disconnected;
        session.typing.clear();
        let was_active = self.active_chat.as_deref() == Some(chat_id);
        if was_active {
            self.active_chat = None;
        }
        self.deleted.insert(
            chat_id.to_string(),
            DeletedChat {
                chat,
                session,
                index,
                was_active,
            },
        );
        Some(was_active)
    }

    /// Puts a stashed chat back at (or near) its old list position.
    /// Returns whether it had been the active chat.
    pub(crate) fn restore_delete(&mut self, chat_id: &str) -> Option<bool> {
        let stash = self.deleted.remove(chat_id)?;
        let index = stash.index.min(self.chats.len());
        self.chats.insert(index, stash.chat);
        self.sessions.insert(chat_id.to_string(), stash.session);
        if stash.was_active {
            self.active_chat = Some(chat_id.to_string());
        }
        Some(stash.was_active)
    }

    pub(crate) fn discard_delete(&mut self, chat_id: &str) {
        self.deleted.remove(chat_id);
    }

    // ========================================================================
    // Typing presence
    // ========================================================================

    pub(crate) fn note_typing(
        &mut self,
        chat_id: &str,
        user_id: &str,
        assistant: bool,
        now: DateTime<Utc>,
    ) {
        let session = self.session_entry(chat_id);
        if let Some(entry) = session.typing.iter_mut().find(|t| t.user_id == user_id) {
            entry.timestamp = now;
            entry.assistant = assistant;
        } else {
            session.typing.push(TypingUser {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
                timestamp: now,
                assistant,
            });
        }
    }

    pub(crate) fn clear_typing(&mut self, chat_id: &str, user_id: &str) {
        if let Some(session) = self.sessions.get_mut(chat_id) {
            session.typing.retain(|t| t.user_id != user_id);
        }
    }

    // ========================================================================
    // Time-driven sweeps
    // ========================================================================

    /// Drops typing entries that have not re-signalled within the quiet
    /// window. Missed stop frames expire here.
    pub(crate) fn expire_typing(&mut self, now: DateTime<Utc>) {
        let quiet = self.timing.typing_quiet;
        for session in self.sessions.values_mut() {
            session.typing.retain(|t| now - t.timestamp < quiet);
        }
    }

    /// Fails in-flight sends whose bounded wait has elapsed. Returns the
    /// affected (chat id, message id) pairs.
    pub(crate) fn timeout_sends(&mut self, now: DateTime<Utc>) -> Vec<(String, String)> {
        let timeout = self.timing.send_timeout;
        let mut failed = Vec::new();
        for (chat_id, session) in self.sessions.iter_mut() {
            let expired: Vec<String> = session
                .in_flight
                .iter()
                .filter(|p| now - p.sent_at >= timeout)
                .map(|p| p.message_id.clone())
                .collect();
            if expired.is_empty() {
                continue;
            }
            session
                .in_flight
                .retain(|p| !expired.contains(&p.message_id));
            for id in expired {
                if let Some(message) = session.messages.iter_mut().find(|m| m.id == id) {
                    message.status = message.status.advance(MessageStatus::Failed);
                    failed.push((chat_id.clone(), id));
                }
            }
        }
        failed
    }

    pub(crate) fn clear_stale_error(&mut self, now: DateTime<Utc>) {
        if let Some(error) = &self.last_error
            && now - error.at >= self.timing.error_display
        {
            self.last_error = None;
        }
    }

    pub(crate) fn record_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        warn!("session error: {message}");
        self.last_error = Some(LastError { message, at: now });
    }
}
