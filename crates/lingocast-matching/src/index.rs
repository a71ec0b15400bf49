// SPDX-License-Identifier: GPL-3.0-or-later

//! Fuzzy index over the text database.
//!
//! Lookup runs an ordered list of [`MatchStrategy`] objects; the first one
//! that produces a result wins:
//!
//! 1. **Exact**: compact query equals a compact key (score 1.0)
//! 2. **Containment**: one compact form contains the other with enough
//!    coverage (score 0.98)
//! 3. **Fuzzy**: best token-set/indel similarity inside a length band, with a
//!    length-disparity penalty and a length-window recovery pass for long
//!    queries
//!
//! Keys are bucketed by compact length, so banded and windowed searches only
//! visit the buckets in range. Scoring skips any key whose cheap upper bound
//! cannot beat the best score found so far.
//!
//! The index is immutable once built; rebuilding is the only way to change it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lingocast_config::MatchingConfig;
use lingocast_domain::{DatabaseEntry, ResolutionPath, ResolvedMatch, TextDatabase};
use moka::sync::Cache;
use tracing::{debug, info};

use crate::normalize::{clean_line, compact, normalize, word_count};
use crate::similarity::{ratio, ratio_upper_bound, token_set_ratio, token_set_upper_bound, unique_tokens};
use crate::{MatchingError, Result};

const CONTAINMENT_SCORE: f32 = 0.98;
const CONTAINMENT_MIN_CHARS: usize = 10;
const CONTAINMENT_MIN_COVERAGE: f32 = 0.6;

const SHORT_QUERY_CHARS: usize = 20;
const MEDIUM_QUERY_CHARS: usize = 50;
const LONG_QUERY_WORDS: usize = 6;
const LONG_QUERY_CHARS: usize = 40;

const GUARD_MIN_KEY_CHARS: usize = 20;
const GUARD_MAX_KEY_WORDS: usize = 3;

const RECOVERY_MIN_QUERY_CHARS: usize = 100;
const RECOVERY_SHORT_KEY_CHARS: usize = 50;

// ============================================================================
// Thresholds
// ============================================================================

/// Acceptance floors for fuzzy results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub short_query: f32,
    pub long_query: f32,
    pub recovery: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            short_query: 0.85,
            long_query: 0.70,
            recovery: 0.60,
        }
    }
}

impl Thresholds {
    pub fn new(short_query: f32, long_query: f32, recovery: f32) -> Result<Self> {
        Ok(Self {
            short_query: validate_threshold("short_query", short_query)?,
            long_query: validate_threshold("long_query", long_query)?,
            recovery: validate_threshold("recovery", recovery)?,
        })
    }

    pub fn from_config(config: &MatchingConfig) -> Result<Self> {
        Self::new(
            config.short_query_threshold,
            config.long_query_threshold,
            config.recovery_threshold,
        )
    }

    fn floor_for(&self, query: &Query) -> f32 {
        if query.len < SHORT_QUERY_CHARS {
            self.short_query
        } else {
            self.long_query
        }
    }
}

fn validate_threshold(name: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(MatchingError::InvalidThreshold { name, value })
    }
}

// ============================================================================
// Keys and queries
// ============================================================================

/// A database key with its precomputed comparison forms.
#[derive(Debug, Clone)]
pub struct IndexedKey {
    pub entry: Arc<DatabaseEntry>,
    pub normalized: String,
    pub compact: String,
    /// Character count of the compact form.
    pub len: usize,
    /// Word count, when it can be known.
    pub words: Option<usize>,
    tokens: Vec<String>,
}

impl IndexedKey {
    pub fn new(entry: Arc<DatabaseEntry>) -> Self {
        let normalized = normalize(&entry.key);
        let compact = compact(&normalized);
        let len = compact.chars().count();

        let own_words = word_count(&normalized);
        let words = if own_words > 1 {
            Some(own_words)
        } else {
            entry
                .primary()
                .and_then(|m| m.source_text.as_deref())
                .map(|text| word_count(&normalize(text)))
                .filter(|count| *count > 0)
        };

        let tokens = unique_tokens(&normalized);
        Self {
            entry,
            normalized,
            compact,
            len,
            words,
            tokens,
        }
    }

    /// Too short to ever be the answer for a long query.
    fn excluded_for_long_query(&self) -> bool {
        self.len < GUARD_MIN_KEY_CHARS || self.words.is_some_and(|w| w <= GUARD_MAX_KEY_WORDS)
    }
}

/// A normalized lookup query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub normalized: String,
    pub compact: String,
    pub len: usize,
    pub words: usize,
    tokens: Vec<String>,
}

impl Query {
    pub fn new(text: &str) -> Self {
        Self::from_normalized(normalize(&clean_line(text)))
    }

    fn from_normalized(normalized: String) -> Self {
        let compact = compact(&normalized);
        let len = compact.chars().count();
        let words = word_count(&normalized);
        let tokens = unique_tokens(&normalized);
        Self {
            normalized,
            compact,
            len,
            words,
            tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.compact.is_empty()
    }

    pub fn is_long(&self) -> bool {
        self.words >= LONG_QUERY_WORDS || self.len >= LONG_QUERY_CHARS
    }

    /// Allowed relative length difference for fuzzy candidates, if banded.
    fn band_tolerance(&self) -> Option<f32> {
        if self.is_long() {
            None
        } else if self.len < SHORT_QUERY_CHARS {
            Some(0.3)
        } else if self.len < MEDIUM_QUERY_CHARS {
            Some(0.4)
        } else {
            None
        }
    }
}

/// Keys plus the exact-match table and compact-length buckets.
#[derive(Debug, Default)]
pub struct KeyTable {
    keys: Vec<IndexedKey>,
    by_compact: HashMap<String, usize>,
    by_len: BTreeMap<usize, Vec<usize>>,
}

impl KeyTable {
    pub fn new(database: &TextDatabase) -> Self {
        let mut keys: Vec<IndexedKey> = database
            .entries()
            .iter()
            .cloned()
            .map(IndexedKey::new)
            .filter(|key| !key.compact.is_empty())
            .collect();
        keys.sort_by(|a, b| a.compact.cmp(&b.compact).then(a.entry.key.cmp(&b.entry.key)));

        let mut by_compact = HashMap::with_capacity(keys.len());
        let mut by_len: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (position, key) in keys.iter().enumerate() {
            // First key in sorted order wins when two keys share a compact form.
            by_compact.entry(key.compact.clone()).or_insert(position);
            by_len.entry(key.len).or_default().push(position);
        }

        Self {
            keys,
            by_compact,
            by_len,
        }
    }

    pub fn keys(&self) -> &[IndexedKey] {
        &self.keys
    }

    pub fn exact(&self, compact: &str) -> Option<&IndexedKey> {
        self.by_compact.get(compact).map(|&i| &self.keys[i])
    }

    /// Keys eligible for scoring against `query` after the length-disparity guard.
    pub fn candidates<'a>(&'a self, query: &'a Query) -> impl Iterator<Item = &'a IndexedKey> + 'a {
        let guarded = query.is_long();
        self.keys
            .iter()
            .filter(move |key| !(guarded && key.excluded_for_long_query()))
    }

    /// Keys whose compact length lies in `low..=high`, in table order within
    /// each length.
    pub fn with_len_between(&self, low: usize, high: usize) -> impl Iterator<Item = &IndexedKey> + '_ {
        (low <= high)
            .then(|| self.by_len.range(low..=high))
            .into_iter()
            .flatten()
            .flat_map(move |(_, positions)| positions.iter().map(move |&i| &self.keys[i]))
    }

    /// Like [`KeyTable::candidates`], restricted to a compact-length range.
    pub fn candidates_between<'a>(
        &'a self,
        query: &'a Query,
        low: usize,
        high: usize,
    ) -> impl Iterator<Item = &'a IndexedKey> + 'a {
        let guarded = query.is_long();
        self.with_len_between(low, high)
            .filter(move |key| !(guarded && key.excluded_for_long_query()))
    }
}

/// Whole-number length range covering `[low, high]`.
fn len_range(low: f32, high: f32) -> (usize, usize) {
    (low.max(0.0).floor() as usize, high.max(0.0).ceil() as usize)
}

fn resolved(key: &IndexedKey, query: &Query, score: f32, raw_score: f32, path: ResolutionPath) -> ResolvedMatch {
    ResolvedMatch {
        entry: Arc::clone(&key.entry),
        score: score.clamp(0.0, 1.0),
        raw_score: raw_score.clamp(0.0, 1.0),
        matched_key: key.entry.key.clone(),
        query_key: query.normalized.clone(),
        path,
    }
}

/// Shortest key first, then lexical.
fn key_order(a: &IndexedKey, b: &IndexedKey) -> Ordering {
    a.len.cmp(&b.len).then_with(|| a.compact.cmp(&b.compact))
}

// ============================================================================
// Strategies
// ============================================================================

/// One step of the lookup chain.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch>;
}

#[derive(Debug, Default)]
pub struct ExactStrategy;

impl MatchStrategy for ExactStrategy {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn attempt(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch> {
        table
            .exact(&query.compact)
            .map(|key| resolved(key, query, 1.0, 1.0, ResolutionPath::Exact))
    }
}

#[derive(Debug, Default)]
pub struct ContainmentStrategy;

impl ContainmentStrategy {
    /// Coverage (shorter / longer) when the pair qualifies as a containment match.
    fn coverage(key: &IndexedKey, query: &Query) -> Option<f32> {
        let shorter = key.len.min(query.len);
        let longer = key.len.max(query.len);
        if shorter < CONTAINMENT_MIN_CHARS || longer == 0 {
            return None;
        }
        let coverage = shorter as f32 / longer as f32;
        if coverage < CONTAINMENT_MIN_COVERAGE {
            return None;
        }
        let contained = query.compact.contains(key.compact.as_str()) || key.compact.contains(query.compact.as_str());
        contained.then_some(coverage)
    }
}

impl MatchStrategy for ContainmentStrategy {
    fn name(&self) -> &'static str {
        "containment"
    }

    fn attempt(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch> {
        let q = query.len as f32;
        let (low, high) = len_range(q * CONTAINMENT_MIN_COVERAGE, q / CONTAINMENT_MIN_COVERAGE);
        table
            .candidates_between(query, low, high)
            .filter_map(|key| Self::coverage(key, query).map(|coverage| (key, coverage)))
            .min_by(|(a, a_cov), (b, b_cov)| b_cov.total_cmp(a_cov).then_with(|| key_order(a, b)))
            .map(|(key, coverage)| resolved(key, query, CONTAINMENT_SCORE, coverage, ResolutionPath::Containment))
    }
}

/// Similarity search with the length-disparity penalty and recovery pass.
#[derive(Debug, Default)]
pub struct FuzzyStrategy {
    thresholds: Thresholds,
}

impl FuzzyStrategy {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    fn raw_score(key: &IndexedKey, query: &Query) -> f32 {
        token_set_ratio(&query.normalized, &key.normalized).max(ratio(&query.compact, &key.compact))
    }

    fn raw_upper_bound(key: &IndexedKey, query: &Query) -> f32 {
        token_set_upper_bound(&query.tokens, &key.tokens).max(ratio_upper_bound(query.len, key.len))
    }

    /// Highest raw score, then shortest key, then lexical. Keys whose raw
    /// score cannot reach `min_raw` are skipped; the penalty never raises a
    /// score, so none of them could have been accepted.
    fn best<'a>(
        pool: impl Iterator<Item = &'a IndexedKey>,
        query: &Query,
        min_raw: f32,
    ) -> Option<(&'a IndexedKey, f32)> {
        let mut bounded: Vec<(f32, &IndexedKey)> = pool
            .map(|key| (Self::raw_upper_bound(key, query), key))
            .filter(|(bound, _)| *bound >= min_raw)
            .collect();
        bounded.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut best: Option<(&IndexedKey, f32)> = None;
        for (bound, key) in bounded {
            if best.is_some_and(|(_, best_raw)| bound < best_raw) {
                break;
            }
            let raw = Self::raw_score(key, query);
            let better = match best {
                None => true,
                Some((current, best_raw)) => {
                    raw > best_raw || (raw == best_raw && key_order(key, current) == Ordering::Less)
                }
            };
            if better {
                best = Some((key, raw));
            }
        }
        best
    }

    /// Down-weight keys much longer than the query.
    pub fn weighted(raw: f32, key_len: usize, query_len: usize) -> f32 {
        let key_len = key_len as f32;
        let query_len_f = query_len as f32;
        if key_len > 2.0 * query_len_f && query_len < SHORT_QUERY_CHARS {
            raw * 0.3
        } else if key_len > 1.5 * query_len_f && raw < 0.97 {
            raw * 0.7
        } else {
            raw
        }
    }

    fn banded(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch> {
        let q = query.len as f32;
        let pool: Vec<&IndexedKey> = match query.band_tolerance() {
            Some(tolerance) => {
                let (low, high) = len_range(q - tolerance * q, q + tolerance * q);
                table
                    .candidates_between(query, low, high)
                    .filter(|key| (key.len as f32 - q).abs() <= tolerance * q)
                    .collect()
            }
            None => table.candidates(query).collect(),
        };

        let floor = self.thresholds.floor_for(query);
        let (key, raw) = Self::best(pool.into_iter(), query, floor)?;
        let weighted = Self::weighted(raw, key.len, query.len);
        debug!(target: "matching", key = %key.entry.key, raw, weighted, floor, "best fuzzy candidate");
        (weighted >= floor).then(|| resolved(key, query, weighted, raw, ResolutionPath::Fuzzy))
    }

    fn recovery(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch> {
        let low = query.len as f32 * 0.5;
        let high = query.len as f32 * 1.5;
        let (low_len, high_len) = len_range(low, high);
        let pool = table
            .candidates_between(query, low_len, high_len)
            .filter(|key| (low..=high).contains(&(key.len as f32)));

        let (key, raw) = Self::best(pool, query, self.thresholds.recovery)?;
        let weighted = Self::weighted(raw, key.len, query.len);
        debug!(target: "matching", key = %key.entry.key, raw, weighted, "recovery candidate");
        (weighted >= self.thresholds.recovery)
            .then(|| resolved(key, query, weighted, raw, ResolutionPath::Recovery))
    }
}

impl MatchStrategy for FuzzyStrategy {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn attempt(&self, table: &KeyTable, query: &Query) -> Option<ResolvedMatch> {
        let banded = self.banded(table, query);

        let needs_recovery = query.len > RECOVERY_MIN_QUERY_CHARS
            && banded.as_ref().map_or(true, |found| {
                compact(&normalize(&found.matched_key)).chars().count() < RECOVERY_SHORT_KEY_CHARS
            });

        if needs_recovery {
            if let Some(recovered) = self.recovery(table, query) {
                return Some(recovered);
            }
        }
        banded
    }
}

// ============================================================================
// Index
// ============================================================================

/// Read-only lookup structure built from a [`TextDatabase`].
pub struct FuzzyIndex {
    table: KeyTable,
    strategies: Vec<Box<dyn MatchStrategy>>,
    aliases: HashMap<String, String>,
    cache: Cache<String, Option<ResolvedMatch>>,
}

impl std::fmt::Debug for FuzzyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuzzyIndex")
            .field("keys", &self.table.keys.len())
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

impl FuzzyIndex {
    /// Build with default thresholds, no aliases and the default cache size.
    pub fn new(database: &TextDatabase) -> Self {
        Self::with_parts(database, Thresholds::default(), HashMap::new(), 1000)
    }

    pub fn from_config(database: &TextDatabase, config: &MatchingConfig) -> Result<Self> {
        let thresholds = Thresholds::from_config(config)?;
        let aliases = config
            .aliases
            .iter()
            .map(|(from, to)| (compact(&normalize(from)), compact(&normalize(to))))
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .collect();
        Ok(Self::with_parts(
            database,
            thresholds,
            aliases,
            config.lookup_cache_capacity,
        ))
    }

    fn with_parts(
        database: &TextDatabase,
        thresholds: Thresholds,
        aliases: HashMap<String, String>,
        cache_capacity: u64,
    ) -> Self {
        let table = KeyTable::new(database);
        let strategies: Vec<Box<dyn MatchStrategy>> = vec![
            Box::new(ExactStrategy),
            Box::new(ContainmentStrategy),
            Box::new(FuzzyStrategy::new(thresholds)),
        ];
        info!(
            target: "matching",
            keys = table.keys.len(),
            aliases = aliases.len(),
            "fuzzy index built"
        );
        Self {
            table,
            strategies,
            aliases,
            cache: Cache::new(cache_capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.table.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.keys.is_empty()
    }

    /// Resolve free text to a database entry, or `None` when nothing clears
    /// the acceptance floor.
    pub fn lookup(&self, text: &str) -> Option<ResolvedMatch> {
        let mut query = Query::new(text);
        if query.is_empty() {
            return None;
        }
        if let Some(target) = self.aliases.get(&query.compact) {
            debug!(target: "matching", from = %query.compact, to = %target, "alias applied");
            query = Query::from_normalized(target.clone());
        }

        if let Some(cached) = self.cache.get(&query.normalized) {
            return cached;
        }

        let result = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.attempt(&self.table, &query));

        match &result {
            Some(found) => debug!(
                target: "matching",
                query = %query.normalized,
                key = %found.matched_key,
                path = %found.path,
                score = found.score,
                "query resolved"
            ),
            None => debug!(target: "matching", query = %query.normalized, "no match"),
        }

        self.cache.insert(query.normalized.clone(), result.clone());
        result
    }

    /// The longest key shorter than `shorter_than` characters whose compact
    /// form appears inside `text`.
    ///
    /// The key must cover at least 60% of `shorter_than`, and the
    /// length-disparity guard of a long `text` applies as it does in
    /// [`FuzzyIndex::lookup`]. `raw_score` is that coverage.
    pub fn contained_key(&self, text: &str, shorter_than: usize) -> Option<ResolvedMatch> {
        let query = Query::new(text);
        if query.is_empty() || shorter_than <= CONTAINMENT_MIN_CHARS {
            return None;
        }
        let min_len = CONTAINMENT_MIN_COVERAGE * shorter_than as f32;
        let (low, _) = len_range(min_len, min_len);
        self.table
            .candidates_between(&query, low.max(CONTAINMENT_MIN_CHARS), shorter_than - 1)
            .filter(|key| key.len as f32 >= min_len)
            .filter(|key| query.compact.contains(key.compact.as_str()))
            .min_by(|a, b| b.len.cmp(&a.len).then_with(|| a.compact.cmp(&b.compact)))
            .map(|key| {
                let coverage = key.len as f32 / shorter_than as f32;
                resolved(key, &query, CONTAINMENT_SCORE, coverage, ResolutionPath::Containment)
            })
    }

    /// Whether `key`'s compact form is contained in the compact form of `text`.
    pub fn key_contained_in(key: &str, text: &str) -> bool {
        let key = compact(&normalize(key));
        !key.is_empty() && compact(&normalize(text)).contains(key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingocast_domain::Match;

    fn entry(key: &str, text_key: &str) -> DatabaseEntry {
        DatabaseEntry {
            key: key.to_string(),
            matches: vec![Match {
                text_key: text_key.to_string(),
                official_translation: format!("译:{text_key}"),
                source_file: "MultiText.json".to_string(),
                audio_rule: None,
                terms: Vec::new(),
                source_text: None,
                audio_event: None,
            }],
        }
    }

    fn index(keys: &[&str]) -> FuzzyIndex {
        let entries = keys
            .iter()
            .enumerate()
            .map(|(i, k)| entry(k, &format!("Key_{i}")))
            .collect();
        FuzzyIndex::new(&TextDatabase::from_entries(entries))
    }

    #[test]
    fn exact_match_on_compact_form() {
        let index = index(&["stoprightthere", "stop"]);
        let found = index.lookup("Stop right there!").expect("should resolve");
        assert_eq!(found.matched_key, "stoprightthere");
        assert_eq!(found.path, ResolutionPath::Exact);
        assert_eq!(found.score, 1.0);
    }

    #[test]
    fn containment_is_never_displaced_by_shorter_key() {
        let index = index(&["stoprightthere", "stop"]);
        for query in ["stoprightthere", "Stop right there, traveler", "stop right ther e!"] {
            let found = index.lookup(query).expect("should resolve");
            assert_eq!(found.matched_key, "stoprightthere", "query: {query}");
            assert!(matches!(found.path, ResolutionPath::Exact | ResolutionPath::Containment));
        }
    }

    #[test]
    fn containment_prefers_highest_coverage() {
        let index = index(&[
            "the wind carries old songs",
            "the wind carries old songs across the plains",
        ]);
        let found = index
            .lookup("the wind carries old songs across the plains tonight")
            .expect("should resolve");
        assert_eq!(found.path, ResolutionPath::Containment);
        assert_eq!(found.matched_key, "the wind carries old songs across the plains");
        assert_eq!(found.score, 0.98);
    }

    #[test]
    fn containment_requires_coverage() {
        // key covers well under 60% of the query
        let index = index(&["welcome home"]);
        assert!(index
            .lookup("welcome home, we have prepared a feast for everyone in town")
            .is_none());
    }

    #[test]
    fn fuzzy_tolerates_recognition_noise() {
        let index = index(&["with training and fine tuning you'll boost your output"]);
        let found = index
            .lookup("With training and fine-tunlng, you'll boost your outpul.")
            .expect("should resolve");
        assert_eq!(found.path, ResolutionPath::Fuzzy);
        assert!(found.score >= 0.70 && found.score < 1.0);
    }

    #[test]
    fn short_queries_need_high_similarity() {
        let index = index(&["open the gate"]);
        assert!(index.lookup("open the bag").is_none());
        assert!(index.lookup("open the gale").is_some());
    }

    #[test]
    fn long_query_never_selects_short_keys() {
        let index = index(&[
            "stop",
            "the end",
            "thank you",
            "hello there friend",
            "the caravan moved slowly across the endless dunes while the merchants argued about prices and the guards watched the horizon",
        ]);
        let sentence = "the caravan moved slowly across the endless dunes while the merchants argued about prices and the guards watched the horizon";
        let long_query = std::iter::repeat(sentence).take(4).collect::<Vec<_>>().join(" ");
        assert!(long_query.len() >= 400);
        assert!(long_query.split_whitespace().count() >= 50);

        let found = index.lookup(&long_query).expect("should resolve");
        assert!(found.matched_key.split_whitespace().count() > 3);
        assert!(!["stop", "the end", "thank you", "hello there friend"].contains(&found.matched_key.as_str()));
    }

    #[test]
    fn long_query_without_a_long_key_is_unresolved() {
        let index = index(&["stop", "the end", "thank you"]);
        let long_query = "stop the end thank you ".repeat(20);
        assert!(index.lookup(&long_query).is_none());
    }

    #[test]
    fn penalty_weights() {
        assert!((FuzzyStrategy::weighted(1.0, 45, 10) - 0.3).abs() < 1e-6);
        assert!((FuzzyStrategy::weighted(0.9, 40, 25) - 0.63).abs() < 1e-6);
        assert_eq!(FuzzyStrategy::weighted(0.98, 40, 25), 0.98);
        assert_eq!(FuzzyStrategy::weighted(0.9, 30, 25), 0.9);
    }

    #[test]
    fn recovery_pass_finds_similar_length_key() {
        let long_key = "the archivist kept every letter the soldiers sent home and read them aloud each winter so the names would not be forgotten by the village";
        let index = index(&[long_key, "the archivist kept every letter"]);
        let noisy = "thc archivst kept evry lettr the soldirs sent hom and red them alowd each wintr so the nams would nt be forgottn by the vilage";
        let found = index.lookup(noisy).expect("should resolve");
        assert_eq!(found.matched_key, long_key);
        assert!(matches!(found.path, ResolutionPath::Fuzzy | ResolutionPath::Recovery));
    }

    #[test]
    fn ties_break_on_shortest_then_lexical_key() {
        // same tokens, same length: both score 1.0 on token-set similarity
        let index = index(&["key gate north", "gate north key"]);
        let found = index.lookup("north gate key").expect("should resolve");
        assert_eq!(found.path, ResolutionPath::Fuzzy);
        assert_eq!(found.matched_key, "gate north key");
    }

    #[test]
    fn aliases_rewrite_queries() {
        let mut config = MatchingConfig::default();
        config
            .aliases
            .insert("Rover".to_string(), "the wanderer returns".to_string());
        let database = TextDatabase::from_entries(vec![entry("the wanderer returns", "Name_1")]);
        let index = FuzzyIndex::from_config(&database, &config).expect("index should build");
        let found = index.lookup("ROVER").expect("alias should resolve");
        assert_eq!(found.path, ResolutionPath::Exact);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let config = MatchingConfig {
            long_query_threshold: 1.5,
            ..MatchingConfig::default()
        };
        let err = FuzzyIndex::from_config(&TextDatabase::default(), &config).unwrap_err();
        assert_eq!(
            err,
            MatchingError::InvalidThreshold {
                name: "long_query",
                value: 1.5
            }
        );
        assert!(Thresholds::new(f32::NAN, 0.7, 0.6).is_err());
    }

    #[test]
    fn empty_query_is_unresolved() {
        let index = index(&["stoprightthere"]);
        assert!(index.lookup("!!! ...").is_none());
        assert!(index.lookup("").is_none());
    }

    #[test]
    fn repeated_lookups_hit_the_cache() {
        let index = index(&["stoprightthere"]);
        let first = index.lookup("Stop right there!");
        let second = index.lookup("stop right there");
        assert_eq!(first, second);
    }

    #[test]
    fn contained_key_prefers_longest_shorter_key() {
        let index = index(&["ms voss", "you'll boost your output", "with training you'll boost your output"]);
        let found = index
            .contained_key("Ms. Voss With training, you'll boost your output.", 30)
            .expect("contained key");
        assert_eq!(found.matched_key, "you'll boost your output");
        assert!(FuzzyIndex::key_contained_in("ms voss", "Ms. Voss said hello"));
    }

    #[test]
    fn contained_key_respects_coverage_and_long_query_guard() {
        let index = index(&["you'll boost your output", "stop right there"]);
        let text = "Ms. Voss With training, you'll boost your output. Stop right there!";

        // 20 characters cover less than 60% of 40
        assert!(index.contained_key(text, 40).is_none());

        let found = index.contained_key(text, 25).expect("covers 80%");
        assert_eq!(found.matched_key, "you'll boost your output");
        assert!((found.raw_score - 0.8).abs() < 1e-6);

        // three words: never an answer for a long text
        assert!(index.contained_key(text, 16).is_none());
        assert!(index.contained_key("stop right there, stranger", 16).is_some());
    }

    #[test]
    fn length_buckets_cover_exactly_the_requested_range() {
        let keys = ["stop", "the end", "thank you", "open the gate", "hello there friend", "gate north key"];
        let index = index(&keys);
        let table = &index.table;

        let mut lens: Vec<usize> = table.with_len_between(6, 12).map(|key| key.len).collect();
        lens.sort_unstable();
        let mut expected: Vec<usize> = table.keys().iter().map(|key| key.len).filter(|len| (6..=12).contains(len)).collect();
        expected.sort_unstable();
        assert_eq!(lens, expected);
        assert!(!lens.is_empty());

        assert_eq!(table.with_len_between(0, usize::MAX).count(), keys.len());
        assert_eq!(table.with_len_between(12, 6).count(), 0);
    }

    #[test]
    fn bounded_search_agrees_with_exhaustive_scoring() {
        let index = index(&[
            "open the gate",
            "open the gale",
            "gate north key",
            "key gate north",
            "the river remembers every name",
            "the river forgets",
            "hello there friend",
            "with training you'll boost your output",
        ]);
        let table = &index.table;
        for text in [
            "open the bag",
            "north gate key",
            "the river remembers evry name",
            "with trainng youll boost yur output",
            "hello friend",
        ] {
            let query = Query::new(text);
            let exhaustive = table
                .keys()
                .iter()
                .map(|key| (key, FuzzyStrategy::raw_score(key, &query)))
                .min_by(|(a, a_raw), (b, b_raw)| b_raw.total_cmp(a_raw).then_with(|| key_order(a, b)))
                .map(|(key, raw)| (key.entry.key.clone(), raw));
            let bounded = FuzzyStrategy::best(table.keys().iter(), &query, 0.0)
                .map(|(key, raw)| (key.entry.key.clone(), raw));
            assert_eq!(bounded, exhaustive, "query: {text}");
        }
    }
}
