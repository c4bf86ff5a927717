//! # View Projections
//!
//! Pure read-side helpers between the store and whatever draws the screen.
//! Nothing here mutates session state or performs I/O; every function is a
//! projection of a snapshot plus explicit inputs (scroll flag, clock,
//! limits), which keeps the whole layer testable by equality.
//!
//! - [`message_list`]: grouping, auto-scroll, streaming cursor, height cache
//! - [`composer`]: draft buffer, send gate, debounced typing signals
//! - [`sources`]: citation ranking and dedup for assistant messages

pub mod composer;
pub mod message_list;
pub mod sources;

pub use composer::{Composer, QuietTimer, Submission, TypingSignal};
pub use message_list::{plan, HeightCache, MessageBlock, RenderPlan};
pub use sources::{rank, SourceAttribution};
