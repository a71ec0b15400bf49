// SPDX-License-Identifier: GPL-3.0-or-later

//! Declared event names per text key.
//!
//! The map file is a JSON object of `text_key -> [event names]`, typically
//! exported from the game's configuration tables. Event references there are
//! often full asset paths (`/Game/Aki/WwiseAudio/Events/vo_x.vo_x`); only the
//! final name is kept.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{AudioError, Result};

/// Reduce an asset reference to a bare event name.
pub fn normalize_event_name(raw: &str) -> String {
    let mut name = raw.trim().trim_end_matches('.');
    if let Some((_, last)) = name.rsplit_once('/') {
        name = last;
    }
    if let Some((_, last)) = name.rsplit_once('.') {
        name = last;
    }
    name.trim().to_string()
}

#[derive(Debug, Clone, Default)]
pub struct EventMap {
    events: HashMap<String, Vec<String>>,
}

impl EventMap {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| AudioError::io(path, e))?;
        let map = Self::from_json_str(&raw)?;
        info!(target: "audio", path = %path.display(), keys = map.events.len(), "event map loaded");
        Ok(map)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(raw)?;
        let mut events: HashMap<String, Vec<String>> = HashMap::new();

        let Some(object) = root.as_object() else {
            warn!(target: "audio", "event map root is not an object, ignoring");
            return Ok(Self::default());
        };

        for (text_key, value) in object {
            let names: Vec<&str> = match value {
                Value::String(name) => vec![name.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };
            let bucket = events.entry(text_key.clone()).or_default();
            for name in names {
                let name = normalize_event_name(name);
                if !name.is_empty() && !bucket.contains(&name) {
                    bucket.push(name);
                }
            }
        }
        events.retain(|_, names| !names.is_empty());

        Ok(Self { events })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut events: HashMap<String, Vec<String>> = HashMap::new();
        for (key, name) in pairs {
            let name = normalize_event_name(&name.into());
            if !name.is_empty() {
                events.entry(key.into()).or_default().push(name);
            }
        }
        Self { events }
    }

    pub fn events_for(&self, text_key: &str) -> &[String] {
        self.events.get(text_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every declared event name, across all text keys.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.events.values().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_paths_and_namespaces() {
        assert_eq!(normalize_event_name("/Game/Events/vo_x.vo_x"), "vo_x");
        assert_eq!(normalize_event_name("vo_plain"), "vo_plain");
        assert_eq!(normalize_event_name("  /Game/Events/vo_y.  "), "vo_y");
        assert_eq!(normalize_event_name(""), "");
    }

    #[test]
    fn parses_lists_and_single_names() {
        let map = EventMap::from_json_str(
            r#"{
                "Main_1": ["/Game/Events/vo_main_1.vo_main_1", "vo_main_1", ""],
                "Main_2": "play_vo_main_2",
                "Main_3": 12
            }"#,
        )
        .expect("map should parse");

        assert_eq!(map.events_for("Main_1"), ["vo_main_1".to_string()]);
        assert_eq!(map.events_for("Main_2"), ["play_vo_main_2".to_string()]);
        assert!(map.events_for("Main_3").is_empty());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("events.json");
        std::fs::write(&path, r#"{"Key": ["vo_key"]}"#).expect("fixture should be written");
        let map = EventMap::load(&path).expect("map should load");
        assert_eq!(map.events_for("Key"), ["vo_key".to_string()]);
    }
}
