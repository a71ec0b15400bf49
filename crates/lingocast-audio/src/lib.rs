// SPDX-License-Identifier: GPL-3.0-or-later

//! Voice-line resolution: event-name hashing, candidate generation and the
//! decode fallback chain backed by an on-disk cache.

pub mod bank;
pub mod cache;
pub mod candidates;
pub mod error;
pub mod event_index;
pub mod event_map;
pub mod hash;
pub mod lock;
pub mod resolver;
pub mod sources;
pub mod tools;

pub use bank::{parse_bank, BankHit, BankIndex, BankInfo};
pub use cache::{AudioCache, CacheEntry};
pub use candidates::{prioritize_protagonist, snake_case, CandidateGenerator};
pub use error::{AudioError, BankError, Result, ToolError};
pub use event_index::EventNameIndex;
pub use event_map::{normalize_event_name, EventMap};
pub use hash::hash_event_name;
pub use lock::{KeyedGuard, KeyedMutex};
pub use resolver::{
    AudioResolver, AudioStrategy, BankEventStrategy, ExternalSourceStrategy, HashDirectStrategy,
};
pub use sources::SourceIndex;
pub use tools::{
    run_tool, BankParser, Transcoder, VgmstreamTranscoder, WwiserBankParser, PLAYLISTS_COMPLETE,
};
