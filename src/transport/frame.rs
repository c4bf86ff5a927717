//! # Realtime Frames
//!
//! The JSON frames exchanged over a chat's realtime link. Inbound frames are
//! a closed union with an `Unknown` catch-all so a newer backend can ship
//! frame kinds this client skips instead of choking on.
//!
//! Tagging is `{"type": "message-created", ...}` with kebab-case kinds.

use serde::{Deserialize, Serialize};

use crate::api::types::MessageDto;
use crate::core::model::ConnectionState;

/// Client-to-server frames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundFrame {
    /// A message send. `client_id` is the optimistic entry's local id; the
    /// server assigns its own id and echoes the message back as a
    /// `message-created` frame.
    SendMessage {
        chat_id: String,
        content: String,
        client_id: String,
    },
    TypingStart { chat_id: String },
    TypingStop { chat_id: String },
}

impl OutboundFrame {
    pub fn chat_id(&self) -> &str {
        match self {
            OutboundFrame::SendMessage { chat_id, .. }
            | OutboundFrame::TypingStart { chat_id }
            | OutboundFrame::TypingStop { chat_id } => chat_id,
        }
    }

    pub fn is_typing(&self) -> bool {
        matches!(
            self,
            OutboundFrame::TypingStart { .. } | OutboundFrame::TypingStop { .. }
        )
    }

    /// True when this frame makes `prev` redundant on the wire: a later
    /// typing signal for the same chat replaces an undelivered earlier one.
    /// Message sends are never coalesced.
    pub fn supersedes(&self, prev: &OutboundFrame) -> bool {
        self.is_typing() && prev.is_typing() && self.chat_id() == prev.chat_id()
    }
}

/// Server-to-client frames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundFrame {
    MessageCreated {
        message: MessageDto,
    },
    MessageUpdated {
        message: MessageDto,
    },
    TypingStart {
        chat_id: String,
        user_id: String,
        #[serde(default)]
        assistant: bool,
    },
    TypingStop {
        chat_id: String,
        user_id: String,
    },
    Presence {
        chat_id: String,
        state: ConnectionState,
    },
    Error {
        #[serde(default)]
        chat_id: Option<String>,
        message: String,
    },
    /// Any frame kind this client does not understand.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// The chat this frame belongs to, when it names one.
    pub fn chat_id(&self) -> Option<&str> {
        match self {
            InboundFrame::MessageCreated { message } | InboundFrame::MessageUpdated { message } => {
                Some(&message.chat_id)
            }
            InboundFrame::TypingStart { chat_id, .. }
            | InboundFrame::TypingStop { chat_id, .. }
            | InboundFrame::Presence { chat_id, .. } => Some(chat_id),
            InboundFrame::Error { chat_id, .. } => chat_id.as_deref(),
            InboundFrame::Unknown => None,
        }
    }
}
