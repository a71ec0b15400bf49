// SPDX-License-Identifier: GPL-3.0-or-later

//! On-disk cache of decoded audio, keyed by event hash.
//!
//! Files live at `<dir>/{id}.{ext}`. Writers produce a temporary file and
//! rename it into place, so a reader never observes a partial file and probes
//! need no lock. Writers for the same id are serialized through
//! [`AudioCache::lock`]. The JSON index mirrors the directory contents and is
//! reconciled with a scan when the cache is opened.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use lingocast_config::AudioConfig;
use lingocast_domain::AudioFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AudioError, Result};
use crate::lock::{KeyedGuard, KeyedMutex};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: u32,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    generated_at: DateTime<Utc>,
    entries: Vec<CacheEntry>,
}

fn cache_id(path: &Path) -> Option<(u32, AudioFormat)> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(AudioFormat::from_extension)?;
    let id = path.file_stem()?.to_str()?.parse::<u32>().ok()?;
    Some((id, format))
}

fn modified_at(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::now()))
}

#[derive(Debug)]
pub struct AudioCache {
    dir: PathBuf,
    index_path: PathBuf,
    max_bytes: u64,
    entries: Mutex<BTreeMap<u32, CacheEntry>>,
    locks: KeyedMutex<u32>,
    temp_counter: AtomicU64,
}

impl AudioCache {
    pub fn from_config(config: &AudioConfig) -> Result<Self> {
        Self::open(
            &config.cache_dir,
            &config.index_path(),
            config.cache_max_mb.saturating_mul(BYTES_PER_MB),
        )
    }

    /// Open (creating if needed) a cache directory. `max_bytes == 0` disables eviction.
    pub fn open(dir: &Path, index_path: &Path, max_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| AudioError::io(dir, e))?;

        let mut entries = load_index(index_path);
        let indexed = entries.len();
        entries.retain(|_, entry| entry.path.is_file());

        for item in std::fs::read_dir(dir).map_err(|e| AudioError::io(dir, e))? {
            let item = item.map_err(|e| AudioError::io(dir, e))?;
            let path = item.path();
            let Some((id, _)) = cache_id(&path) else {
                continue;
            };
            let Ok(meta) = item.metadata() else {
                continue;
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            entries.insert(
                id,
                CacheEntry {
                    hash: id,
                    path,
                    size: meta.len(),
                    modified: modified_at(&meta),
                },
            );
        }

        let cache = Self {
            dir: dir.to_path_buf(),
            index_path: index_path.to_path_buf(),
            max_bytes,
            entries: Mutex::new(BTreeMap::new()),
            locks: KeyedMutex::default(),
            temp_counter: AtomicU64::new(0),
        };

        for evicted in evict_oldest(&mut entries, max_bytes, None) {
            if let Err(error) = std::fs::remove_file(&evicted.path) {
                warn!(target: "audio", path = %evicted.path.display(), %error, "failed to evict cache file");
            }
        }
        write_index(&cache.index_path, &entries)?;
        info!(
            target: "audio",
            dir = %dir.display(),
            indexed,
            entries = entries.len(),
            "audio cache opened"
        );

        Ok(Self {
            entries: Mutex::new(entries),
            ..cache
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// First existing, non-empty `{id}.{ext}` in format priority order.
    pub async fn probe(&self, id: u32) -> Option<(PathBuf, AudioFormat)> {
        for format in AudioFormat::PRIORITY {
            let path = self.path_for(id, format);
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.is_file() && meta.len() > 0 {
                    return Some((path, format));
                }
            }
        }
        None
    }

    pub fn path_for(&self, id: u32, format: AudioFormat) -> PathBuf {
        self.dir.join(format!("{id}.{}", format.extension()))
    }

    /// Exclusive write guard for `id`.
    pub async fn lock(&self, id: u32) -> KeyedGuard<u32> {
        self.locks.lock(id).await
    }

    /// A fresh temporary path that a scan never mistakes for a cached file.
    pub fn temp_path(&self, id: u32, format: AudioFormat) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{id}.{}.{n}.partial.{}", std::process::id(), format.extension()))
    }

    /// Move a finished temporary file into place and record it.
    pub async fn commit(&self, temp: &Path, id: u32, format: AudioFormat) -> Result<PathBuf> {
        let target = self.path_for(id, format);
        tokio::fs::rename(temp, &target)
            .await
            .map_err(|e| AudioError::io(&target, e))?;
        let meta = tokio::fs::metadata(&target)
            .await
            .map_err(|e| AudioError::io(&target, e))?;

        let mut entries = self.entries.lock().await;
        entries.insert(
            id,
            CacheEntry {
                hash: id,
                path: target.clone(),
                size: meta.len(),
                modified: modified_at(&meta),
            },
        );
        for evicted in evict_oldest(&mut entries, self.max_bytes, Some(id)) {
            if let Err(error) = tokio::fs::remove_file(&evicted.path).await {
                warn!(target: "audio", path = %evicted.path.display(), %error, "failed to evict cache file");
            }
        }
        // Holding `entries` keeps index writes in commit order.
        write_index_async(&self.index_path, &entries).await?;
        debug!(target: "audio", id, path = %target.display(), "cache entry written");
        Ok(target)
    }

    /// Remove a temporary file left by a failed decode.
    pub async fn discard(&self, temp: &Path) {
        if let Err(error) = tokio::fs::remove_file(temp).await {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(target: "audio", path = %temp.display(), %error, "failed to remove temporary file");
            }
        }
    }

    pub async fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().await.values().cloned().collect()
    }
}

fn load_index(index_path: &Path) -> BTreeMap<u32, CacheEntry> {
    let raw = match std::fs::read_to_string(index_path) {
        Ok(raw) => raw,
        Err(_) => return BTreeMap::new(),
    };
    match serde_json::from_str::<IndexFile>(&raw) {
        Ok(file) => file.entries.into_iter().map(|e| (e.hash, e)).collect(),
        Err(error) => {
            warn!(target: "audio", path = %index_path.display(), %error, "cache index unreadable, rebuilding");
            BTreeMap::new()
        }
    }
}

fn index_json(entries: &BTreeMap<u32, CacheEntry>) -> Result<String> {
    let file = IndexFile {
        generated_at: Utc::now(),
        entries: entries.values().cloned().collect(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

fn write_index(index_path: &Path, entries: &BTreeMap<u32, CacheEntry>) -> Result<()> {
    let json = index_json(entries)?;
    if let Some(parent) = index_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AudioError::io(parent, e))?;
    }
    let temp = index_path.with_extension("json.partial");
    std::fs::write(&temp, json).map_err(|e| AudioError::io(&temp, e))?;
    std::fs::rename(&temp, index_path).map_err(|e| AudioError::io(index_path, e))
}

async fn write_index_async(index_path: &Path, entries: &BTreeMap<u32, CacheEntry>) -> Result<()> {
    let json = index_json(entries)?;
    if let Some(parent) = index_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AudioError::io(parent, e))?;
    }
    let temp = index_path.with_extension("json.partial");
    tokio::fs::write(&temp, json)
        .await
        .map_err(|e| AudioError::io(&temp, e))?;
    tokio::fs::rename(&temp, index_path)
        .await
        .map_err(|e| AudioError::io(index_path, e))
}

/// Drop the oldest entries until the total fits in `max_bytes` and return
/// them; the caller deletes their files.
fn evict_oldest(entries: &mut BTreeMap<u32, CacheEntry>, max_bytes: u64, keep: Option<u32>) -> Vec<CacheEntry> {
    let mut evicted = Vec::new();
    if max_bytes == 0 {
        return evicted;
    }
    let mut total: u64 = entries.values().map(|e| e.size).sum();
    if total <= max_bytes {
        return evicted;
    }

    let mut by_age: Vec<(DateTime<Utc>, u32)> = entries
        .values()
        .filter(|e| Some(e.hash) != keep)
        .map(|e| (e.modified, e.hash))
        .collect();
    by_age.sort();

    for (_, id) in by_age {
        if total <= max_bytes {
            break;
        }
        if let Some(entry) = entries.remove(&id) {
            total = total.saturating_sub(entry.size);
            debug!(target: "audio", id, "evicted cache entry");
            evicted.push(entry);
        }
    }
    evicted
}
