// SPDX-License-Identifier: GPL-3.0-or-later

//! Last-request-wins handling of recognition results.
//!
//! Every submission takes a ticket from a monotonically increasing counter.
//! A finished result is delivered only if no newer submission has been made
//! in the meantime; otherwise it is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lingocast_domain::{AudioAsset, RecognizedLine};
use lingocast_matching::SegmentResolution;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct LatestGate {
    latest: AtomicU64,
}

impl LatestGate {
    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// `Some(value)` only while `ticket` is the newest one issued.
    pub fn accept<T>(&self, ticket: Ticket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            debug!(target: "application", ticket = ticket.0, "discarding stale result");
            None
        }
    }
}

/// What a consumer receives for one accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub ticket: Ticket,
    pub segments: Vec<SegmentResolution>,
    pub audio: Option<AudioAsset>,
}

impl Resolution {
    pub fn primary(&self) -> Option<&SegmentResolution> {
        self.segments.iter().find(|segment| segment.primary().is_some())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    engine: Arc<Engine>,
    gate: Arc<LatestGate>,
}

impl Session {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            gate: Arc::new(LatestGate::default()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Resolve text and, with `with_audio`, the voice line of the first
    /// resolved segment. Returns `None` when superseded by a newer submission.
    #[instrument(skip_all, fields(lines = lines.len(), with_audio = with_audio))]
    pub async fn submit(&self, lines: Vec<RecognizedLine>, with_audio: bool) -> Option<Resolution> {
        let ticket = self.gate.issue();
        let segments = self.engine.resolve_lines(&lines);

        let mut audio = None;
        if with_audio {
            let entry = segments
                .iter()
                .find_map(|segment| segment.primary())
                .map(|found| Arc::clone(&found.entry));
            if let Some(entry) = entry.filter(|_| self.gate.is_current(ticket)) {
                audio = self.engine.resolve_audio(&entry).await;
            }
        }

        self.gate.accept(ticket, Resolution { ticket, segments, audio })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_newest_ticket_is_accepted() {
        let gate = LatestGate::default();
        let first = gate.issue();
        assert!(gate.is_current(first));

        let second = gate.issue();
        assert!(second > first);
        assert_eq!(gate.accept(first, "old"), None);
        assert_eq!(gate.accept(second, "new"), Some("new"));
    }

    #[test]
    fn tickets_are_unique_across_threads() {
        let gate = Arc::new(LatestGate::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..100).map(|_| gate.issue().value()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread should finish"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert!(gate.is_current(Ticket(400)));
    }
}
