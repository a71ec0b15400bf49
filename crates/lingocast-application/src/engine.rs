// SPDX-License-Identifier: GPL-3.0-or-later

//! The resolution engine: text lookup plus audio resolution over one database.

use std::sync::{Arc, RwLock};

use lingocast_audio::AudioResolver;
use lingocast_config::AppConfig;
use lingocast_domain::{AudioAsset, AudioCandidate, DatabaseEntry, RecognizedLine, ResolvedMatch, TextDatabase};
use lingocast_matching::{FuzzyIndex, MatchResolver, SegmentResolution};
use tracing::{info, instrument};

use crate::error::{ApplicationError, Result};

pub struct Engine {
    config: AppConfig,
    text: RwLock<Arc<MatchResolver>>,
    audio: Arc<AudioResolver>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.config.database.path)
            .field("keys", &self.text_resolver().index().len())
            .field("audio", &self.audio)
            .finish()
    }
}

fn build_resolver(config: &AppConfig) -> Result<MatchResolver> {
    let database = TextDatabase::load(&config.database.path)?;
    let index = FuzzyIndex::from_config(&database, &config.matching)?;
    Ok(MatchResolver::new(Arc::new(index)))
}

impl Engine {
    /// Load the database, build the index and prepare the audio chain.
    #[instrument(skip_all, fields(database = %config.database.path.display()))]
    pub async fn open(config: AppConfig) -> Result<Self> {
        let text_config = config.clone();
        let text = tokio::task::spawn_blocking(move || build_resolver(&text_config))
            .await
            .map_err(|e| ApplicationError::Task(e.to_string()))??;
        let audio = AudioResolver::from_config(&config.audio).await?;

        info!(target: "application", keys = text.index().len(), "engine ready");
        Ok(Self {
            config,
            text: RwLock::new(Arc::new(text)),
            audio: Arc::new(audio),
        })
    }

    pub fn with_parts(config: AppConfig, text: MatchResolver, audio: AudioResolver) -> Self {
        Self {
            config,
            text: RwLock::new(Arc::new(text)),
            audio: Arc::new(audio),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Current text resolver. Requests keep the snapshot they started with across a reload.
    pub fn text_resolver(&self) -> Arc<MatchResolver> {
        let guard = self.text.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the database file and swap in a freshly built index.
    ///
    /// On error the previous index stays in place.
    pub fn reload_database(&self) -> Result<usize> {
        let rebuilt = build_resolver(&self.config)?;
        let keys = rebuilt.index().len();
        let mut guard = self.text.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(rebuilt);
        info!(target: "application", keys, "database reloaded");
        Ok(keys)
    }

    pub fn resolve_text(&self, text: &str) -> Option<ResolvedMatch> {
        self.text_resolver().resolve_text(text)
    }

    pub fn resolve_lines(&self, lines: &[RecognizedLine]) -> Vec<SegmentResolution> {
        self.text_resolver().resolve_lines(lines)
    }

    pub fn audio_candidates(&self, entry: &DatabaseEntry) -> Vec<AudioCandidate> {
        self.audio.generator().generate(entry)
    }

    pub async fn resolve_audio(&self, entry: &DatabaseEntry) -> Option<AudioAsset> {
        self.audio.resolve(entry).await
    }
}
