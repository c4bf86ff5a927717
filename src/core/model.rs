//! # Domain Model
//!
//! The entities owned by the chat session store: chats, messages, typing
//! presence, and per-chat connection state. Wire shapes (REST bodies and
//! transport frames) live in `api::types` and `transport::frame`; this module
//! holds the in-memory truth those shapes are converted into.
//!
//! Two invariants are enforced here rather than in the reducer so they hold
//! for every caller:
//!
//! - **Status monotonicity**: `MessageStatus::advance` only moves forward
//!   (sending -> sent -> delivered -> read). `Failed` is terminal and only
//!   reachable from `Sending`; a failed message is retried by re-sending
//!   under a fresh id, never by mutating the failed entry back to life.
//! - **Stable ordering**: `insert_position` places a message by server
//!   sequence when both sides have one, falling back to the client timestamp.
//!   Existing entries never move; acks and streaming updates mutate in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    User,
    Assistant,
}

/// Conversation shape, as reported by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
    Channel,
}

/// Delivery state of a message. Forward-only, see [`MessageStatus::advance`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            // Never compared by rank: both Failed cases short-circuit in advance().
            MessageStatus::Failed => 0,
        }
    }

    /// Applies a requested transition, returning the resulting status.
    ///
    /// Replayed or out-of-order frames must not move a message backwards, so
    /// a lower-ranked status is ignored. `Failed` is terminal and can only be
    /// entered from `Sending` (a delivery that never completed).
    pub fn advance(self, next: MessageStatus) -> MessageStatus {
        use MessageStatus::{Failed, Sending};
        match (self, next) {
            (Failed, _) => Failed,
            (Sending, Failed) => Failed,
            (_, Failed) => self,
            _ if next.rank() > self.rank() => next,
            _ => self,
        }
    }
}

/// A retrieval citation attached to an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct RagSource {
    pub title: String,
    pub origin_document_id: Option<String>,
    /// Relevance in `[0, 1]`. Conversions clamp out-of-range backend values.
    pub similarity_score: Option<f32>,
    pub page_number: Option<u32>,
}

/// One message in a chat's ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: SenderRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// True while content is still arriving; cleared by the terminal update.
    pub streaming: bool,
    pub sources: Vec<RagSource>,
    /// Server-assigned sequence number. `None` until the server has seen it.
    pub seq: Option<u64>,
    pub ai_model: Option<String>,
    pub tokens_used: Option<u32>,
    pub latency_ms: Option<u64>,
}

impl Message {
    /// Builds a locally authored message awaiting delivery. The id is a
    /// client-generated uuid, replaced by the server id on acknowledgement.
    pub fn outgoing(chat_id: &str, content: String, now: DateTime<Utc>) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender: SenderRole::User,
            content,
            timestamp: now,
            status: MessageStatus::Sending,
            streaming: false,
            sources: Vec::new(),
            seq: None,
            ai_model: None,
            tokens_used: None,
            latency_ms: None,
        }
    }

    /// An optimistic client entry the server has not acknowledged yet.
    /// Covers failed sends too: their timestamps are client-stamped.
    pub(crate) fn unacked(&self) -> bool {
        self.seq.is_none()
            && matches!(self.status, MessageStatus::Sending | MessageStatus::Failed)
    }

    /// Folds an inbound snapshot of the same message into this entry.
    ///
    /// Content is replaced (streaming growth and explicit edits both arrive
    /// as full snapshots), status advances monotonically, and the first
    /// server sequence sticks. The entry's position in the list is untouched.
    pub fn merge_inbound(&mut self, incoming: &Message) {
        self.content = incoming.content.clone();
        self.status = self.status.advance(incoming.status);
        self.streaming = incoming.streaming;
        self.timestamp = incoming.timestamp;
        if !incoming.sources.is_empty() {
            self.sources = incoming.sources.clone();
        }
        if self.seq.is_none() {
            self.seq = incoming.seq;
        }
        if incoming.ai_model.is_some() {
            self.ai_model = incoming.ai_model.clone();
        }
        if incoming.tokens_used.is_some() {
            self.tokens_used = incoming.tokens_used;
        }
        if incoming.latency_ms.is_some() {
            self.latency_ms = incoming.latency_ms;
        }
    }
}

/// Returns true if `a` must appear before `b` in a chat's sequence.
///
/// Unacknowledged sends hold the tail: their client-clock timestamps are
/// not comparable with server timestamps. Among the rest, server sequence
/// wins when both messages carry one; otherwise the timestamp decides.
fn orders_before(a: &Message, b: &Message) -> bool {
    match (a.unacked(), b.unacked()) {
        (false, true) => return true,
        (true, false) => return false,
        _ => {}
    }
    match (a.seq, b.seq) {
        (Some(x), Some(y)) => x < y,
        _ => a.timestamp < b.timestamp,
    }
}

/// Insertion index for `incoming` that keeps the sequence sorted without
/// moving any existing entry. Ties insert after their equals, preserving
/// arrival order.
pub(crate) fn insert_position(messages: &[Message], incoming: &Message) -> usize {
    messages.partition_point(|existing| !orders_before(incoming, existing))
}

/// A user currently typing in a chat. Ephemeral: never persisted, expired
/// after the quiet window or on an explicit stop frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingUser {
    pub user_id: String,
    pub chat_id: String,
    /// Last typing signal; expiry compares against this.
    pub timestamp: DateTime<Utc>,
    pub assistant: bool,
}

/// Realtime channel state for one chat session. Drives composer enablement.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// One conversation as listed by the backend, plus the local `pending` flag
/// for optimistic entries that are still awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: ChatKind,
    pub assistant_id: Option<String>,
    pub ai_model: Option<String>,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
    pub pending: bool,
}

impl Chat {
    /// Builds the optimistic placeholder inserted by a create intent. The id
    /// is a client-generated uuid, atomically swapped for the server id once
    /// creation is confirmed.
    pub fn draft(title: &str, assistant_id: &str, now: DateTime<Utc>) -> Self {
        Chat {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: None,
            kind: ChatKind::Direct,
            assistant_id: Some(assistant_id.to_string()),
            ai_model: None,
            message_count: 0,
            last_activity: now,
            pending: true,
        }
    }
}
