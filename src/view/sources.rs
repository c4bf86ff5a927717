//! Source attribution ranking.
//!
//! Assistant messages arrive with the raw retrieval citations the backend
//! used. This module turns that list into display entries: best score first,
//! one entry per underlying source, truncated to the configured display
//! count while keeping the full ranked list for a "show more" expansion.

use std::cmp::Ordering;

use crate::core::model::RagSource;

/// Identity of a citation for dedup purposes. Two citations of the same
/// document page are the same source even when the backend titled them
/// differently; without a document id the title is all we have.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SourceKey {
    Document { id: String, page: Option<u32> },
    Title(String),
}

fn source_key(source: &RagSource) -> SourceKey {
    match &source.origin_document_id {
        Some(id) => SourceKey::Document {
            id: id.clone(),
            page: source.page_number,
        },
        None => SourceKey::Title(source.title.clone()),
    }
}

/// Does `candidate` beat `kept` for the same key? Any score beats no score.
fn outranks(candidate: &RagSource, kept: &RagSource) -> bool {
    match (candidate.similarity_score, kept.similarity_score) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// The ranked, deduplicated source list plus its display truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAttribution {
    /// Full ranked list, kept for expansion.
    pub ranked: Vec<RagSource>,
    pub display_limit: usize,
}

impl SourceAttribution {
    /// The entries shown before "show more".
    pub fn visible(&self) -> &[RagSource] {
        &self.ranked[..self.display_limit.min(self.ranked.len())]
    }

    /// How many entries the truncation hides.
    pub fn overflow(&self) -> usize {
        self.ranked.len().saturating_sub(self.display_limit)
    }
}

/// Ranks a message's source list for display.
///
/// Dedup keeps the best-scored citation per [`SourceKey`]; the survivors are
/// sorted by score descending with unscored entries last. The sort is
/// stable, so equal scores keep their first-seen order.
pub fn rank(sources: &[RagSource], display_limit: usize) -> SourceAttribution {
    let mut ranked: Vec<RagSource> = Vec::new();
    for source in sources {
        let key = source_key(source);
        match ranked.iter_mut().find(|kept| source_key(kept) == key) {
            Some(kept) => {
                if outranks(source, kept) {
                    *kept = source.clone();
                }
            }
            None => ranked.push(source.clone()),
        }
    }

    ranked.sort_by(|a, b| match (a.similarity_score, b.similarity_score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    SourceAttribution {
        ranked,
        display_limit,
    }
}
