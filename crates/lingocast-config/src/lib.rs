// SPDX-License-Identifier: GPL-3.0-or-later
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/game_text_db.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Acceptance floor for queries shorter than 20 characters.
    pub short_query_threshold: f32,
    /// Acceptance floor for everything longer.
    pub long_query_threshold: f32,
    /// Acceptance floor used by the length-window recovery pass.
    pub recovery_threshold: f32,
    /// Number of lookup results kept in memory.
    pub lookup_cache_capacity: u64,
    /// Normalized query -> database key rewrites applied before lookup.
    pub aliases: BTreeMap<String, String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            short_query_threshold: 0.85,
            long_query_threshold: 0.70,
            recovery_threshold: 0.60,
            lookup_cache_capacity: 1000,
            aliases: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub program: PathBuf,
    /// Arguments placed before the generated ones (e.g. a script path for an interpreter).
    pub leading_args: Vec<String>,
    pub timeout_secs: u64,
}

impl ToolConfig {
    fn new(program: &str, leading_args: &[&str]) -> Self {
        Self {
            program: PathBuf::from(program),
            leading_args: leading_args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    Female,
    Male,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub cache_dir: PathBuf,
    /// Defaults to `<cache_dir>/audio_index.json` when unset.
    pub index_path: Option<PathBuf>,
    /// Zero disables eviction.
    pub cache_max_mb: u64,
    /// Root of raw exported streams (`{id}.wem`).
    pub source_root: Option<PathBuf>,
    /// Root of bank files (`*.bnk`).
    pub bank_root: Option<PathBuf>,
    /// Defaults to `<cache_dir>/txtp` when unset.
    pub playlist_dir: Option<PathBuf>,
    /// JSON map of text_key -> declared event names.
    pub event_map_path: Option<PathBuf>,
    pub language: String,
    pub gender_preference: GenderPreference,
    pub heuristic_prefixes: Vec<String>,
    pub transcoder: ToolConfig,
    pub bank_parser: ToolConfig,
}

impl AudioConfig {
    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("audio_index.json"))
    }

    pub fn playlist_dir(&self) -> PathBuf {
        self.playlist_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("txtp"))
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache/audio"),
            index_path: None,
            cache_max_mb: 2048,
            source_root: None,
            bank_root: None,
            playlist_dir: None,
            event_map_path: None,
            language: "zh".to_string(),
            gender_preference: GenderPreference::Female,
            heuristic_prefixes: ["vo_", "play_vo_", "play_", "p_vo_", "toplayer_"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            transcoder: ToolConfig::new("vgmstream-cli", &[]),
            bank_parser: ToolConfig::new("python", &["tools/wwiser.pyz"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub audio: AudioConfig,
    pub telemetry: TelemetryConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: LINGOCAST_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("LINGOCAST_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_usable_without_a_file() {
        let config = load(None).expect("defaults should load");
        assert_eq!(config.matching.short_query_threshold, 0.85);
        assert_eq!(config.matching.recovery_threshold, 0.60);
        assert_eq!(config.audio.gender_preference, GenderPreference::Female);
        assert_eq!(
            config.audio.index_path(),
            PathBuf::from("cache/audio").join("audio_index.json")
        );
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("lingocast.toml");
        fs::write(
            &path,
            r#"
[database]
path = "/srv/db.json"

[matching]
long_query_threshold = 0.75

[matching.aliases]
hp = "mainhp"

[audio]
cache_dir = "/tmp/lingocast-audio"
gender_preference = "male"

[audio.transcoder]
program = "/opt/vgmstream/vgmstream-cli"
leading_args = []
timeout_secs = 5
"#,
        )
        .expect("config file should be written");

        let config = load(Some(&path)).expect("config should load");
        assert_eq!(config.database.path, PathBuf::from("/srv/db.json"));
        assert_eq!(config.matching.long_query_threshold, 0.75);
        assert_eq!(config.matching.aliases.get("hp").map(String::as_str), Some("mainhp"));
        assert_eq!(config.audio.gender_preference, GenderPreference::Male);
        assert_eq!(config.audio.transcoder.timeout_secs, 5);
        assert_eq!(
            config.audio.playlist_dir(),
            PathBuf::from("/tmp/lingocast-audio").join("txtp")
        );
        // Untouched sections keep their defaults.
        assert_eq!(config.audio.bank_parser.program, PathBuf::from("python"));
    }
}
