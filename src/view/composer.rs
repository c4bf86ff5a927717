//! # Composer & Typing Coordinator
//!
//! Owns the draft buffer and turns raw input activity into a debounced
//! typing signal stream:
//!
//! - `Start` at most once per idle-to-active transition
//! - `Stop` after the quiet window with no input, or immediately on submit
//!
//! The quiet window is an explicit arm/cancel deadline driven by injected
//! `now` values, so tests advance a virtual clock instead of sleeping. The
//! composer never talks to the transport itself; the embedding surface maps
//! the signals onto typing frames and the submission onto a send intent.

use chrono::{DateTime, Duration, Utc};

use crate::core::config::ResolvedConfig;
use crate::core::model::ConnectionState;

/// Outbound typing state changes, in the order they must reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

/// A cancellable deadline. Fires exactly once per arm.
#[derive(Debug, Default)]
pub struct QuietTimer {
    deadline: Option<DateTime<Utc>>,
}

impl QuietTimer {
    pub fn arm(&mut self, deadline: DateTime<Utc>) {
        self.deadline = Some(deadline);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once when `now` reaches the armed deadline.
    pub fn fire(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// An accepted submission: the trimmed draft plus whether a typing stop must
/// go out with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub content: String,
    pub send_stop: bool,
}

pub struct Composer {
    buffer: String,
    /// We have signalled `Start` and not yet `Stop`.
    typing: bool,
    timer: QuietTimer,
    quiet: Duration,
    /// Checked once at construction, not per keystroke.
    credentials_present: bool,
}

impl Composer {
    pub fn new(quiet: Duration, credentials_present: bool) -> Self {
        Composer {
            buffer: String::new(),
            typing: false,
            timer: QuietTimer::default(),
            quiet,
            credentials_present,
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.timing.typing_quiet, config.api_token.is_some())
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Replaces the draft with the surface's current input. Any input
    /// activity re-arms the quiet window, including deleting to empty.
    pub fn set_input(
        &mut self,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Option<TypingSignal> {
        self.buffer = text.into();
        self.timer.arm(now + self.quiet);
        if self.typing {
            None
        } else {
            self.typing = true;
            Some(TypingSignal::Start)
        }
    }

    /// Advances the quiet window. Emits `Stop` when the user has gone quiet.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TypingSignal> {
        if self.typing && self.timer.fire(now) {
            self.typing = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// The send gate: non-blank draft, live connection, credentials present.
    pub fn can_send(&self, connection: ConnectionState) -> bool {
        self.credentials_present
            && connection == ConnectionState::Connected
            && !self.buffer.trim().is_empty()
    }

    /// Takes the draft for sending. Clears the buffer and ends the typing
    /// cycle so the stop goes out with the message, not a second later.
    pub fn submit(&mut self, connection: ConnectionState) -> Option<Submission> {
        if !self.can_send(connection) {
            return None;
        }
        let content = self.buffer.trim().to_string();
        self.buffer.clear();
        self.timer.cancel();
        let send_stop = self.typing;
        self.typing = false;
        Some(Submission { content, send_stop })
    }
}
