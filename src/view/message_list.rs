//! # Message List Plan
//!
//! Pure projection of a chat's message sequence into what the surface should
//! draw.
//!
//! ## Responsibilities
//!
//! - Collapse consecutive same-sender messages into display blocks
//! - Decide whether to auto-scroll to the newest message
//! - Place the streaming cursor
//! - Cache per-message heights for windowed rendering of large histories
//!
//! ## Architecture
//!
//! [`plan`] is a pure function: identical inputs yield identical plans, which
//! is what makes grouping testable by equality. [`HeightCache`] is the only
//! stateful piece and must be persisted by the embedding surface across
//! frames; it never reads the store, only the snapshot it is handed.

use chrono::{DateTime, Duration, Utc};

use crate::core::model::{Message, SenderRole};

/// One display block: consecutive messages from the same sender close enough
/// in time to share a single avatar/timestamp header.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBlock {
    pub sender: SenderRole,
    /// Header timestamp, taken from the first message of the block.
    pub started_at: DateTime<Utc>,
    /// Indices into the snapshot this plan was built from.
    pub indices: Vec<usize>,
}

/// Everything the surface needs to draw one frame of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub blocks: Vec<MessageBlock>,
    /// Scroll to the newest message after drawing. False whenever the user
    /// has scrolled away from the bottom.
    pub auto_scroll: bool,
    /// Index of the message that renders a streaming cursor, if any.
    pub streaming_cursor: Option<usize>,
}

/// Projects a message snapshot into a render plan.
///
/// Messages group with their predecessor when the sender matches and the
/// timestamp gap is within `group_gap`. The gap is measured between
/// neighbours, so a long monologue stays one block as long as no single
/// pause exceeds the gap.
pub fn plan(messages: &[Message], scrolled_up: bool, group_gap: Duration) -> RenderPlan {
    let mut blocks: Vec<MessageBlock> = Vec::new();
    let mut prev_timestamp: Option<DateTime<Utc>> = None;

    for (i, message) in messages.iter().enumerate() {
        let joins_previous = match (blocks.last(), prev_timestamp) {
            (Some(block), Some(prev)) => {
                block.sender == message.sender && message.timestamp - prev <= group_gap
            }
            _ => false,
        };
        if joins_previous {
            if let Some(block) = blocks.last_mut() {
                block.indices.push(i);
            }
        } else {
            blocks.push(MessageBlock {
                sender: message.sender,
                started_at: message.timestamp,
                indices: vec![i],
            });
        }
        prev_timestamp = Some(message.timestamp);
    }

    let streaming_cursor = match messages.last() {
        Some(last) if last.streaming => Some(messages.len() - 1),
        _ => None,
    };

    RenderPlan {
        blocks,
        auto_scroll: !scrolled_up,
        streaming_cursor,
    }
}

/// Cached per-message height measurements for windowed rendering.
///
/// Heights are positional, so the cache survives appends but not mid-list
/// inserts: a history merge that lands under pending sends shifts positions,
/// which the tail-id check detects and answers with a full rebuild. The last
/// cached entry is always remeasured because it may have been mid-stream
/// when measured. In-place edits above the tail are not detected; callers
/// applying one should [`HeightCache::invalidate`] first.
#[derive(Debug, Default)]
pub struct HeightCache {
    pub heights: Vec<u16>,
    pub prefix_heights: Vec<u32>,
    message_count: usize,
    content_width: u16,
    tail_id: Option<String>,
}

impl HeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many leading cached heights are still valid for this snapshot.
    pub fn reusable_count(&self, messages: &[Message], content_width: u16) -> usize {
        if self.content_width != content_width || self.heights.is_empty() {
            return 0;
        }
        // Fewer messages than cached means the session was replaced.
        if messages.len() < self.message_count {
            return 0;
        }
        let cached = self.heights.len().min(messages.len());
        if self.tail_id.as_deref() != Some(messages[cached - 1].id.as_str()) {
            return 0;
        }
        cached - 1
    }

    /// Refreshes the cache against a snapshot, measuring only what the
    /// reusable prefix does not cover.
    pub fn rebuild(
        &mut self,
        messages: &[Message],
        content_width: u16,
        measure: impl Fn(&Message, u16) -> u16,
    ) {
        let reusable = self.reusable_count(messages, content_width);
        self.heights.truncate(reusable);
        for message in messages.iter().skip(self.heights.len()) {
            self.heights.push(measure(message, content_width));
        }
        self.rebuild_prefix_heights();
        self.message_count = messages.len();
        self.content_width = content_width;
        self.tail_id = messages.last().map(|m| m.id.clone());
    }

    /// Drops every cached measurement. For in-place edits above the tail,
    /// which the reuse heuristics cannot see.
    pub fn invalidate(&mut self) {
        self.heights.clear();
        self.prefix_heights.clear();
        self.message_count = 0;
        self.tail_id = None;
    }

    pub fn total_height(&self) -> u32 {
        self.prefix_heights.last().copied().unwrap_or(0)
    }

    fn rebuild_prefix_heights(&mut self) {
        self.prefix_heights = self
            .heights
            .iter()
            .scan(0u32, |acc, &h| {
                *acc += u32::from(h);
                Some(*acc)
            })
            .collect();
    }

    /// Which message indices intersect the viewport, padded by half a
    /// viewport on both sides so scrolling has pre-rendered slack.
    pub fn visible_range(
        &self,
        scroll_offset: u32,
        viewport_height: u16,
    ) -> std::ops::Range<usize> {
        let buffer = u32::from(viewport_height / 2);
        let buffered_start = scroll_offset.saturating_sub(buffer);
        let buffered_end = scroll_offset
            .saturating_add(u32::from(viewport_height))
            .saturating_add(buffer);

        let start = self
            .prefix_heights
            .partition_point(|&end| end <= buffered_start);
        let end = self
            .prefix_heights
            .partition_point(|&end| end < buffered_end)
            .saturating_add(1)
            .min(self.prefix_heights.len());

        start..end
    }
}
