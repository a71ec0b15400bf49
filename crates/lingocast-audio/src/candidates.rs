// SPDX-License-Identifier: GPL-3.0-or-later

//! Event-name candidates for a resolved database entry.
//!
//! Candidates come in four tiers, tried in order:
//! 1. **Declared**: the record's own event and event-map entries
//! 2. **Template**: expansion of the record's audio rule
//! 3. **Indexed**: known event names most similar to the text key and the
//!    first name above
//! 4. **Heuristic**: common prefixes over the text key, then gendered variants
//!
//! Names are de-duplicated by hash since hashing ignores case.

use std::collections::HashSet;
use std::sync::Arc;

use lazy_static::lazy_static;
use lingocast_config::{AudioConfig, GenderPreference};
use lingocast_domain::{AudioCandidate, CandidateRule, DatabaseEntry, Match};
use regex::Regex;

use crate::event_index::{EventNameIndex, DEFAULT_LIMIT, DEFAULT_MIN_SCORE};
use crate::event_map::{normalize_event_name, EventMap};
use crate::hash::hash_event_name;

lazy_static! {
    static ref CAMEL_BOUNDARY: Regex =
        Regex::new(r"([a-z0-9])([A-Z])").expect("camel boundary regex is valid");
}

const FEMALE_MARKERS: [&str; 4] = ["nvzhu", "roverf", "_female", "_f_"];
const MALE_MARKERS: [&str; 4] = ["nanzhu", "roverm", "_male", "_m_"];

/// `Main_LahaiRoi_3` -> `main_lahai_roi_3`.
pub fn snake_case(text_key: &str) -> String {
    let separated = text_key.replace(&['-', '.', ' '][..], "_");
    CAMEL_BOUNDARY
        .replace_all(&separated, "${1}_${2}")
        .to_lowercase()
        .trim_matches('_')
        .to_string()
}

fn has_gender_suffix(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with("_f") || lower.ends_with("_m") || lower.contains("_f_") || lower.contains("_m_")
}

/// 0 for the preferred protagonist variant, 2 for the other one, 1 otherwise.
fn gender_rank(text: &str, preference: GenderPreference) -> u8 {
    let lower = text.to_lowercase();
    let (preferred, other) = match preference {
        GenderPreference::Female => (FEMALE_MARKERS, MALE_MARKERS),
        GenderPreference::Male => (MALE_MARKERS, FEMALE_MARKERS),
    };
    if preferred.iter().any(|m| lower.contains(m)) {
        0
    } else if other.iter().any(|m| lower.contains(m)) {
        2
    } else {
        1
    }
}

/// Order an entry's records so the preferred protagonist variant comes first.
pub fn prioritize_protagonist(matches: &[Match], preference: GenderPreference) -> Vec<&Match> {
    let mut ordered: Vec<&Match> = matches.iter().collect();
    ordered.sort_by_key(|record| {
        let marker_text = format!(
            "{} {}",
            record.text_key,
            record.audio_event.as_deref().unwrap_or_default()
        );
        gender_rank(&marker_text, preference)
    });
    ordered
}

#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    prefixes: Vec<String>,
    gender_preference: GenderPreference,
    event_map: Arc<EventMap>,
    event_index: Arc<EventNameIndex>,
}

impl CandidateGenerator {
    pub fn new(
        prefixes: Vec<String>,
        gender_preference: GenderPreference,
        event_map: Arc<EventMap>,
    ) -> Self {
        Self {
            prefixes,
            gender_preference,
            event_map,
            event_index: Arc::new(EventNameIndex::default()),
        }
    }

    pub fn with_event_index(mut self, event_index: Arc<EventNameIndex>) -> Self {
        self.event_index = event_index;
        self
    }

    pub fn from_config(config: &AudioConfig, event_map: Arc<EventMap>) -> Self {
        Self::new(
            config.heuristic_prefixes.clone(),
            config.gender_preference,
            event_map,
        )
    }

    pub fn generate(&self, entry: &DatabaseEntry) -> Vec<AudioCandidate> {
        let records = prioritize_protagonist(&entry.matches, self.gender_preference);
        let mut list = CandidateList::default();

        for record in &records {
            if let Some(event) = &record.audio_event {
                list.push(normalize_event_name(event), CandidateRule::Declared);
            }
            for event in self.event_map.events_for(&record.text_key) {
                list.push(event.clone(), CandidateRule::Declared);
            }
        }

        for record in &records {
            if let Some(rule) = &record.audio_rule {
                list.push(expand_template(rule, &record.text_key), CandidateRule::Template);
            }
        }

        let mut bases: Vec<String> = list.names().map(str::to_string).collect();

        if let Some(primary) = records.first() {
            let mut seeds = vec![primary.text_key.as_str()];
            seeds.extend(bases.first().map(String::as_str));
            for name in self.event_index.find(&seeds, DEFAULT_LIMIT, DEFAULT_MIN_SCORE) {
                list.push(name.to_string(), CandidateRule::Indexed);
            }
        }

        for record in &records {
            let snake = snake_case(&record.text_key);
            for base in [record.text_key.as_str(), snake.as_str()] {
                if base.is_empty() {
                    continue;
                }
                for prefix in &self.prefixes {
                    let name = format!("{prefix}{base}");
                    if list.push(name.clone(), CandidateRule::Heuristic) {
                        bases.push(name);
                    }
                }
            }
        }

        let (first, second) = match self.gender_preference {
            GenderPreference::Female => ("_f", "_m"),
            GenderPreference::Male => ("_m", "_f"),
        };
        let ungendered: Vec<&String> = bases.iter().filter(|name| !has_gender_suffix(name)).collect();
        for suffix in [first, second] {
            for base in &ungendered {
                list.push(format!("{base}{suffix}"), CandidateRule::Heuristic);
            }
        }

        list.into_inner()
    }
}

fn expand_template(rule: &str, text_key: &str) -> String {
    rule.replace("{text_key_lower}", &text_key.to_lowercase())
        .replace("{text_key}", text_key)
}

#[derive(Default)]
struct CandidateList {
    seen: HashSet<u32>,
    items: Vec<AudioCandidate>,
}

impl CandidateList {
    /// Returns whether the name was new.
    fn push(&mut self, name: String, rule: CandidateRule) -> bool {
        let name = name.trim().to_string();
        if name.is_empty() || name.contains('{') {
            return false;
        }
        let hash = hash_event_name(&name);
        if !self.seen.insert(hash) {
            return false;
        }
        self.items.push(AudioCandidate { name, rule, hash });
        true
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|c| c.name.as_str())
    }

    fn into_inner(self) -> Vec<AudioCandidate> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text_key: &str) -> Match {
        Match {
            text_key: text_key.to_string(),
            official_translation: "站住！".to_string(),
            source_file: "MultiText.json".to_string(),
            audio_rule: Some("vo_{text_key}".to_string()),
            terms: Vec::new(),
            source_text: None,
            audio_event: None,
        }
    }

    fn generator(event_map: EventMap) -> CandidateGenerator {
        CandidateGenerator::from_config(&AudioConfig::default(), Arc::new(event_map))
    }

    #[test]
    fn snake_case_splits_camel_words() {
        assert_eq!(snake_case("Main_LahaiRoi_3_1_1_2"), "main_lahai_roi_3_1_1_2");
        assert_eq!(snake_case("FavorWord.Linnai-01"), "favor_word_linnai_01");
    }

    #[test]
    fn template_candidate_uses_reference_hash() {
        let entry = DatabaseEntry {
            key: "stoprightthere".to_string(),
            matches: vec![record("Main_LahaiRoi_3_1_1_2")],
        };
        let candidates = generator(EventMap::default()).generate(&entry);

        let first = &candidates[0];
        assert_eq!(first.rule, CandidateRule::Template);
        assert_eq!(first.name, "vo_Main_LahaiRoi_3_1_1_2");
        assert_eq!(first.hash, 1_580_911_979);
    }

    #[test]
    fn declared_events_come_first() {
        let mut with_event = record("Main_1");
        with_event.audio_event = Some("/Game/Events/play_vo_main_1.play_vo_main_1".to_string());
        let entry = DatabaseEntry {
            key: "k".to_string(),
            matches: vec![with_event],
        };
        let map = EventMap::from_pairs([("Main_1", "vo_main_1_alt")]);
        let candidates = generator(map).generate(&entry);

        let names: Vec<_> = candidates.iter().take(3).map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["play_vo_main_1", "vo_main_1_alt", "vo_Main_1"]);
        assert_eq!(candidates[0].rule, CandidateRule::Declared);
        assert_eq!(candidates[1].rule, CandidateRule::Declared);
        assert_eq!(candidates[2].rule, CandidateRule::Template);
    }

    #[test]
    fn candidates_are_unique_by_hash_and_never_empty() {
        let mut empty_rule = record("Main_1");
        empty_rule.audio_rule = Some("   ".to_string());
        let entry = DatabaseEntry {
            key: "k".to_string(),
            matches: vec![empty_rule, record("MAIN_1")],
        };
        let candidates = generator(EventMap::default()).generate(&entry);

        let mut hashes = HashSet::new();
        for candidate in &candidates {
            assert!(!candidate.name.is_empty());
            assert!(hashes.insert(candidate.hash), "duplicate {}", candidate.name);
            assert_eq!(candidate.hash, hash_event_name(&candidate.name));
        }
    }

    #[test]
    fn gendered_variants_follow_preference() {
        let entry = DatabaseEntry {
            key: "k".to_string(),
            matches: vec![record("FavorWord_1")],
        };
        let female = generator(EventMap::default()).generate(&entry);
        let first_gendered = female
            .iter()
            .find(|c| has_gender_suffix(&c.name))
            .expect("gendered candidate");
        assert!(first_gendered.name.ends_with("_f"));

        let config = AudioConfig {
            gender_preference: GenderPreference::Male,
            ..AudioConfig::default()
        };
        let male = CandidateGenerator::from_config(&config, Arc::new(EventMap::default())).generate(&entry);
        let first_gendered = male
            .iter()
            .find(|c| has_gender_suffix(&c.name))
            .expect("gendered candidate");
        assert!(first_gendered.name.ends_with("_m"));
    }

    #[test]
    fn heuristic_prefixes_cover_snake_form() {
        let mut no_rule = record("Main_LahaiRoi_3");
        no_rule.audio_rule = None;
        let entry = DatabaseEntry {
            key: "k".to_string(),
            matches: vec![no_rule],
        };
        let names: Vec<String> = generator(EventMap::default())
            .generate(&entry)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names[0], "vo_Main_LahaiRoi_3");
        assert!(names.contains(&"play_vo_main_lahai_roi_3".to_string()));
    }

    #[test]
    fn indexed_names_sit_between_template_and_heuristic_tiers() {
        let entry = DatabaseEntry {
            key: "whereisthelighthousekeeper".to_string(),
            matches: vec![record("Side_Light_02")],
        };
        let index = EventNameIndex::from_names(["play_vo_side_light_02", "vo_side_light_02_f", "ui_click"]);
        let candidates = generator(EventMap::default())
            .with_event_index(Arc::new(index))
            .generate(&entry);

        let rules: Vec<CandidateRule> = candidates.iter().map(|c| c.rule).collect();
        let first_indexed = rules
            .iter()
            .position(|rule| *rule == CandidateRule::Indexed)
            .expect("indexed candidate");
        assert_eq!(candidates[0].name, "vo_Side_Light_02");
        assert_eq!(candidates[first_indexed].name, "play_vo_side_light_02");
        assert!(rules[..first_indexed].iter().all(|rule| *rule != CandidateRule::Heuristic));
        assert!(rules[first_indexed..].iter().all(|rule| matches!(rule, CandidateRule::Indexed | CandidateRule::Heuristic)));
        assert!(!candidates.iter().any(|c| c.name == "ui_click"));
    }

    #[test]
    fn protagonist_variant_is_reordered() {
        let records = vec![record("Main_NanZhu_1"), record("Main_NvZhu_1"), record("Main_Other")];
        let female: Vec<_> = prioritize_protagonist(&records, GenderPreference::Female)
            .into_iter()
            .map(|r| r.text_key.as_str())
            .collect();
        assert_eq!(female, vec!["Main_NvZhu_1", "Main_Other", "Main_NanZhu_1"]);

        let male: Vec<_> = prioritize_protagonist(&records, GenderPreference::Male)
            .into_iter()
            .map(|r| r.text_key.as_str())
            .collect();
        assert_eq!(male, vec!["Main_NanZhu_1", "Main_Other", "Main_NvZhu_1"]);
    }
}
