//! # Realtime Transport
//!
//! Frame types, the transport seam, and the supervision layer that keeps one
//! realtime link alive per joined chat.
//!
//! The core never touches a socket. It emits [`frame::OutboundFrame`]s as
//! effects and consumes [`frame::InboundFrame`]s as intents; everything in
//! between lives here:
//!
//! - [`frame`]: the wire vocabulary, tagged JSON in both directions
//! - [`adapter`]: the [`adapter::ChatTransport`] trait the link layer drives
//! - [`websocket`]: the production transport (tokio-tungstenite)
//! - [`link`]: per-chat supervisors with reconnect backoff and a link cap

pub mod adapter;
pub mod frame;
pub mod link;
pub mod websocket;

pub use adapter::{ChatTransport, CloseReason, TransportError};
pub use frame::{InboundFrame, OutboundFrame};
pub use link::LinkSet;
pub use websocket::WebSocketTransport;
