//! # Core Session Logic
//!
//! This module contains the chat session's business logic.
//! It knows nothing about any specific UI technology and performs no I/O.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • ChatStore (state)    │
//!                    │  • Intent (events)      │
//!                    │  • update() (reducer)   │
//!                    │  • Effect (work out)    │
//!                    │                         │
//!                    │  No I/O. No UI. Pure.   │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │  Transport │      │    REST    │      │    View    │
//!     │  (frames)  │      │  (reqwest) │      │  (render   │
//!     │            │      │            │      │   plans)   │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! Everything that happens becomes an [`intent::Intent`]; `update()` folds it
//! into the [`state::ChatStore`] and hands back [`intent::Effect`]s for the
//! runtime to execute. Time always arrives inside the intent, never from the
//! wall clock, so the whole pipeline runs under a virtual clock in tests.
//!
//! ## Modules
//!
//! - [`model`]: Domain types — `Chat`, `Message`, ordering and status rules
//! - [`state`]: The `ChatStore` struct — all session state in one place
//! - [`intent`]: The `Intent` enum and the `update()` reducer
//! - [`config`]: Sparse TOML config and its resolved form

pub mod config;
pub mod intent;
pub mod model;
pub mod state;

// Re-export the types nearly every caller needs
pub use intent::{update, Effect, Intent};
pub use state::ChatStore;
