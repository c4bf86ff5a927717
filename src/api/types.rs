//! Wire shapes shared by the REST endpoints and the realtime frames.
//!
//! These mirror the backend's JSON field-for-field; `From` impls translate
//! them into the domain types in `core::model`. Keeping the translation here
//! means the store never sees backend naming like `ai_model_used`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::model::{Chat, ChatKind, Message, MessageStatus, RagSource, SenderRole};

/// One chat summary as returned by `GET /chats` and `POST /chats`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatDto {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chat_type: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    pub message_count: u64,
    pub last_activity: DateTime<Utc>,
}

impl From<ChatDto> for Chat {
    fn from(dto: ChatDto) -> Self {
        Chat {
            id: dto.id,
            title: dto.title,
            description: dto.description,
            kind: dto.chat_type,
            assistant_id: dto.assistant_id,
            ai_model: dto.ai_model,
            message_count: dto.message_count,
            last_activity: dto.last_activity,
            pending: false,
        }
    }
}

/// One message as returned by `GET /chats/{id}/messages` and carried inside
/// `message-created` / `message-updated` frames.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageDto {
    pub id: String,
    pub chat_id: String,
    pub sender: SenderRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    /// Absent on REST responses; realtime frames set it while an assistant
    /// reply is still growing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_sources: Option<Vec<RagSourceDto>>,
}

impl From<MessageDto> for Message {
    fn from(dto: MessageDto) -> Self {
        Message {
            id: dto.id,
            chat_id: dto.chat_id,
            sender: dto.sender,
            content: dto.content,
            timestamp: dto.timestamp,
            status: dto.status,
            streaming: dto.streaming,
            sources: dto
                .rag_sources
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
            seq: dto.seq,
            ai_model: dto.ai_model_used,
            tokens_used: dto.tokens_used,
            latency_ms: dto.processing_time_ms,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RagSourceDto {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

impl From<RagSourceDto> for RagSource {
    fn from(dto: RagSourceDto) -> Self {
        RagSource {
            title: dto.title,
            origin_document_id: dto.origin_document_id,
            // Backends have shipped cosine distances outside [0, 1] before.
            similarity_score: dto.similarity_score.map(|s| s.clamp(0.0, 1.0)),
            page_number: dto.page_number,
        }
    }
}

/// Body for `POST /chats`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateChatRequest {
    pub title: String,
    pub assistant_id: String,
}
