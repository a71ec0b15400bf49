// SPDX-License-Identifier: GPL-3.0-or-later

//! Segment-level resolution on top of [`FuzzyIndex`].

use std::sync::Arc;

use lingocast_domain::{RecognizedLine, ResolutionPath, ResolvedMatch, Segment};
use serde::Serialize;
use tracing::debug;

use crate::grouping::LineGrouper;
use crate::index::FuzzyIndex;
use crate::normalize::{compact, normalize};

/// Title and body results for one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentResolution {
    pub segment: Segment,
    pub title: Option<ResolvedMatch>,
    pub body: Option<ResolvedMatch>,
}

impl SegmentResolution {
    /// The body's result when resolved, else the title's.
    pub fn primary(&self) -> Option<&ResolvedMatch> {
        self.body.as_ref().or(self.title.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct MatchResolver {
    index: Arc<FuzzyIndex>,
}

impl MatchResolver {
    pub fn new(index: Arc<FuzzyIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<FuzzyIndex> {
        &self.index
    }

    pub fn resolve_text(&self, text: &str) -> Option<ResolvedMatch> {
        self.index.lookup(text)
    }

    pub fn resolve_segment(&self, segment: &Segment) -> SegmentResolution {
        let title = segment.title.as_deref().and_then(|t| self.index.lookup(t));
        let mut body = segment.body.as_deref().and_then(|b| self.index.lookup(b));

        if segment.title.is_some() {
            body = body.map(|found| self.prefer_contained_key(segment, found));
        }

        SegmentResolution {
            segment: segment.clone(),
            title,
            body,
        }
    }

    /// Swap a fuzzy body result whose key does not appear in the segment text
    /// for a shorter key that does.
    fn prefer_contained_key(&self, segment: &Segment, found: ResolvedMatch) -> ResolvedMatch {
        if found.path.rank() <= ResolutionPath::Containment.rank() {
            return found;
        }

        let combined = segment.combined_text();
        if FuzzyIndex::key_contained_in(&found.matched_key, &combined) {
            return found;
        }

        let body_key_len = compact(&normalize(&found.matched_key)).chars().count();
        match self.index.contained_key(&combined, body_key_len) {
            Some(contained) if contained.matched_key != found.matched_key => {
                debug!(
                    target: "matching",
                    fuzzy_key = %found.matched_key,
                    contained_key = %contained.matched_key,
                    "preferring key contained in segment text"
                );
                contained
            }
            _ => found,
        }
    }

    /// Group lines into segments and resolve each one.
    pub fn resolve_lines(&self, lines: &[RecognizedLine]) -> Vec<SegmentResolution> {
        LineGrouper::new(lines)
            .map(|segment| self.resolve_segment(&segment))
            .collect()
    }
}
