//! Embeddable chat session core.
//!
//! The crate splits along the I/O boundary:
//!
//! - [`core`] holds the store, the reducer, and configuration. No I/O.
//! - [`api`] and [`transport`] talk to the backend (REST endpoints and
//!   realtime frames).
//! - [`runtime`] wires them together behind a dispatch/pump loop.
//! - [`view`] projects store state into render-ready plans for whatever
//!   surface embeds the crate.

pub mod api;
pub mod core;
pub mod runtime;
pub mod transport;
pub mod view;

#[cfg(test)]
pub mod test_support;

pub use runtime::SessionRuntime;
