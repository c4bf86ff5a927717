//! # REST Backend Access
//!
//! The durable half of the backend contract. The realtime link carries
//! frames; everything with request/response shape goes through [`ChatApi`]:
//! chat listing, creation, deletion, and message history.
//!
//! - [`types`]: wire DTOs, kept separate from the domain types in
//!   `core::model` so backend field names never leak past this module
//! - [`client`]: the reqwest client with bearer auth and error capture

pub mod client;
pub mod types;

pub use client::{ApiError, ChatApi};
pub use types::{ChatDto, CreateChatRequest, MessageDto, RagSourceDto};
