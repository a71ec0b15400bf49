// SPDX-License-Identifier: GPL-3.0-or-later

//! Event-name hashing.
//!
//! Audio objects are addressed by the 32-bit FNV-1a hash of the lowercase
//! event name. The hash is the cache key, so it must never change.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// FNV-1a over the lowercase UTF-8 bytes of `name`.
///
/// Callers must not pass an empty name; the candidate generator never
/// produces one.
pub fn hash_event_name(name: &str) -> u32 {
    debug_assert!(!name.is_empty(), "event names are never empty");
    name.to_lowercase()
        .bytes()
        .fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME))
}
