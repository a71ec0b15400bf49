// SPDX-License-Identifier: GPL-3.0-or-later

//! Known event names, searchable by similarity.
//!
//! Names are collected from bank file stems, generated playlist descriptors
//! and the event map. A lookup seeds from a text key or an event name and
//! returns the closest known names, so a voice line whose event does not
//! follow any naming rule can still be found.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use lazy_static::lazy_static;
use lingocast_matching::similarity::token_set_ratio;
use regex::Regex;
use tracing::{debug, info};

lazy_static! {
    static ref CAMEL_BOUNDARY: Regex =
        Regex::new(r"([a-z0-9])([A-Z])").expect("camel boundary regex is valid");
    static ref NON_WORD: Regex = Regex::new(r"[^A-Za-z0-9_]+").expect("non-word regex is valid");
    static ref UNDERSCORES: Regex = Regex::new(r"_+").expect("underscore regex is valid");
}

/// Tokens shared by too many event names to narrow a search.
const NOISE_TOKENS: [&str; 7] = ["play", "vo", "v", "p", "voice", "audio", "event"];

pub const DEFAULT_LIMIT: usize = 8;
pub const DEFAULT_MIN_SCORE: f32 = 0.65;

/// `Play_VO/Main.LahaiRoi-3` -> `play_vo_main_lahai_roi_3`.
fn index_form(name: &str) -> String {
    let name = name.trim().replace(&['/', '\\', '.'][..], "_");
    let name = CAMEL_BOUNDARY.replace_all(&name, "${1}_${2}");
    let name = NON_WORD.replace_all(&name, "_").to_lowercase();
    UNDERSCORES.replace_all(&name, "_").trim_matches('_').to_string()
}

fn search_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split('_')
        .filter(|token| !token.is_empty() && !NOISE_TOKENS.contains(token))
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedName {
    name: String,
    normalized: String,
    compact: String,
    /// `normalized` with spaces between tokens, for token-set scoring.
    spaced: String,
}

impl IndexedName {
    fn new(name: String) -> Self {
        let normalized = index_form(&name);
        Self {
            compact: normalized.replace('_', ""),
            spaced: normalized.replace('_', " "),
            normalized,
            name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventNameIndex {
    names: Vec<IndexedName>,
    by_token: HashMap<String, Vec<usize>>,
}

impl EventNameIndex {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = names
            .into_iter()
            .map(Into::into)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        let names: Vec<IndexedName> = unique
            .into_iter()
            .map(IndexedName::new)
            .filter(|name| !name.normalized.is_empty())
            .collect();

        let mut by_token: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, name) in names.iter().enumerate() {
            for token in search_tokens(&name.normalized) {
                let positions = by_token.entry(token.to_string()).or_default();
                if positions.last() != Some(&position) {
                    positions.push(position);
                }
            }
        }

        Self { names, by_token }
    }

    /// Collect bank stems under `bank_root`, descriptor names under
    /// `playlist_dir` and every name in `extra`. Missing roots are skipped.
    pub fn build<I>(bank_root: Option<&Path>, playlist_dir: Option<&Path>, extra: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut names: Vec<String> = extra.into_iter().collect();
        if let Some(root) = bank_root {
            collect_stems(root, "bnk", &mut names);
        }
        if let Some(root) = playlist_dir {
            collect_stems(root, "txtp", &mut names);
        }
        let index = Self::from_names(names);
        info!(target: "audio", names = index.len(), tokens = index.by_token.len(), "event name index built");
        index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names sharing every search token of the seed, or failing that any of
    /// them. A seed without usable tokens, or without any shared token, is
    /// compared against every name.
    fn pool(&self, tokens: &[&str]) -> Vec<usize> {
        let buckets: Vec<&[usize]> = tokens
            .iter()
            .map(|token| self.by_token.get(*token).map(Vec::as_slice).unwrap_or(&[]))
            .collect();

        if let Some((first, rest)) = buckets.split_first() {
            let shared: Vec<usize> = first
                .iter()
                .copied()
                .filter(|position| rest.iter().all(|bucket| bucket.binary_search(position).is_ok()))
                .collect();
            if !shared.is_empty() {
                return shared;
            }
            let any: BTreeSet<usize> = buckets.iter().flat_map(|bucket| bucket.iter().copied()).collect();
            if !any.is_empty() {
                return any.into_iter().collect();
            }
        }
        (0..self.names.len()).collect()
    }

    fn score(seed: &IndexedName, candidate: &IndexedName) -> f32 {
        if seed.normalized == candidate.normalized {
            return 1.0;
        }
        if seed.compact == candidate.compact {
            return 0.98;
        }
        let containment = if candidate.normalized.contains(&seed.normalized)
            || seed.normalized.contains(&candidate.normalized)
        {
            0.9
        } else {
            0.0
        };
        token_set_ratio(&seed.spaced, &candidate.spaced).max(containment)
    }

    /// Up to `limit` names scoring at least `min_score` against any seed,
    /// best first. Equal scores keep name order.
    pub fn find(&self, seeds: &[&str], limit: usize, min_score: f32) -> Vec<&str> {
        let mut best: HashMap<usize, f32> = HashMap::new();

        for seed in seeds {
            let seed = IndexedName::new(seed.to_string());
            if seed.normalized.is_empty() {
                continue;
            }
            for position in self.pool(&search_tokens(&seed.normalized)) {
                let score = Self::score(&seed, &self.names[position]);
                if score >= min_score {
                    let slot = best.entry(position).or_insert(score);
                    *slot = slot.max(score);
                }
            }
        }

        let mut ranked: Vec<(usize, f32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        debug!(target: "audio", seeds = ?seeds, found = ranked.len(), "event name search");
        ranked
            .into_iter()
            .map(|(position, _)| self.names[position].name.as_str())
            .collect()
    }
}

/// File stems with extension `ext` under `root`. A descriptor stem is cut
/// at its first space, which starts the tool's variant annotations.
fn collect_stems(root: &Path, ext: &str, out: &mut Vec<String>) {
    let mut stack = vec![root.to_path_buf()];
    while let Some(directory) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&directory) else {
            debug!(target: "audio", path = %directory.display(), "directory unreadable, skipping");
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                stack.push(path);
                continue;
            }
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext));
            if !matches {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let name = stem.split_whitespace().next().unwrap_or_default();
                if !name.is_empty() {
                    out.push(name.to_string());
                }
            }
        }
    }
}
