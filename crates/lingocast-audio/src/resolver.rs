// SPDX-License-Identifier: GPL-3.0-or-later

//! Candidate -> playable file, through an ordered chain of strategies.
//!
//! For every candidate the strategies run in priority order and the first
//! asset wins. A strategy error is logged and treated like a miss. Both
//! decoding strategies take the cache's per-id lock and probe again before
//! doing any work, so concurrent requests for one id decode it once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lingocast_config::AudioConfig;
use lingocast_domain::{AssetOrigin, AudioAsset, AudioCandidate, AudioFormat, DatabaseEntry};
use tracing::{debug, info, instrument, warn};

use crate::bank::{BankHit, BankIndex};
use crate::cache::AudioCache;
use crate::candidates::CandidateGenerator;
use crate::error::{AudioError, Result};
use crate::event_index::EventNameIndex;
use crate::event_map::EventMap;
use crate::sources::SourceIndex;
use crate::tools::{BankParser, Transcoder, VgmstreamTranscoder, WwiserBankParser};

/// One way of turning a candidate into a cached, playable file.
#[async_trait]
pub trait AudioStrategy: Send + Sync {
    fn origin(&self) -> AssetOrigin;

    /// `Ok(None)` when this strategy has nothing for the candidate.
    async fn attempt(&self, candidate: &AudioCandidate) -> Result<Option<AudioAsset>>;
}

fn asset(path: PathBuf, format: AudioFormat, origin: AssetOrigin, candidate: &AudioCandidate) -> AudioAsset {
    AudioAsset {
        path,
        format,
        origin,
        cache_key: candidate.hash,
        event_name: candidate.name.clone(),
    }
}

/// Transcode `input` into the cache under `candidate.hash`.
///
/// The caller holds the id's lock. A failed decode leaves nothing behind.
async fn decode_into_cache(
    cache: &AudioCache,
    transcoder: &dyn Transcoder,
    input: &Path,
    candidate: &AudioCandidate,
    origin: AssetOrigin,
) -> Result<AudioAsset> {
    let temp = cache.temp_path(candidate.hash, AudioFormat::Wav);
    if let Err(error) = transcoder.transcode(input, &temp).await {
        cache.discard(&temp).await;
        return Err(error.into());
    }
    let path = match cache.commit(&temp, candidate.hash, AudioFormat::Wav).await {
        Ok(path) => path,
        Err(error) => {
            cache.discard(&temp).await;
            return Err(error);
        }
    };
    info!(
        target: "audio",
        event = %candidate.name,
        id = candidate.hash,
        %origin,
        path = %path.display(),
        "decoded into cache"
    );
    Ok(asset(path, AudioFormat::Wav, origin, candidate))
}

// ============================================================================
// Hash-direct
// ============================================================================

pub struct HashDirectStrategy {
    cache: Arc<AudioCache>,
}

impl HashDirectStrategy {
    pub fn new(cache: Arc<AudioCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl AudioStrategy for HashDirectStrategy {
    fn origin(&self) -> AssetOrigin {
        AssetOrigin::HashDirect
    }

    async fn attempt(&self, candidate: &AudioCandidate) -> Result<Option<AudioAsset>> {
        Ok(self
            .cache
            .probe(candidate.hash)
            .await
            .map(|(path, format)| asset(path, format, self.origin(), candidate)))
    }
}

// ============================================================================
// External source
// ============================================================================

pub struct ExternalSourceStrategy {
    cache: Arc<AudioCache>,
    sources: Arc<SourceIndex>,
    transcoder: Arc<dyn Transcoder>,
}

impl ExternalSourceStrategy {
    pub fn new(cache: Arc<AudioCache>, sources: Arc<SourceIndex>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            cache,
            sources,
            transcoder,
        }
    }
}

#[async_trait]
impl AudioStrategy for ExternalSourceStrategy {
    fn origin(&self) -> AssetOrigin {
        AssetOrigin::ExternalSource
    }

    async fn attempt(&self, candidate: &AudioCandidate) -> Result<Option<AudioAsset>> {
        let Some(source) = self.sources.find(candidate.hash) else {
            return Ok(None);
        };

        let _guard = self.cache.lock(candidate.hash).await;
        if let Some((path, format)) = self.cache.probe(candidate.hash).await {
            debug!(target: "audio", id = candidate.hash, "decoded by a concurrent request");
            return Ok(Some(asset(path, format, AssetOrigin::HashDirect, candidate)));
        }

        decode_into_cache(&self.cache, self.transcoder.as_ref(), source, candidate, self.origin())
            .await
            .map(Some)
    }
}

// ============================================================================
// Bank event
// ============================================================================

pub struct BankEventStrategy {
    cache: Arc<AudioCache>,
    banks: Arc<BankIndex>,
    parser: Arc<dyn BankParser>,
    transcoder: Arc<dyn Transcoder>,
    playlist_dir: PathBuf,
}

impl BankEventStrategy {
    pub fn new(
        cache: Arc<AudioCache>,
        banks: Arc<BankIndex>,
        parser: Arc<dyn BankParser>,
        transcoder: Arc<dyn Transcoder>,
        playlist_dir: PathBuf,
    ) -> Self {
        Self {
            cache,
            banks,
            parser,
            transcoder,
            playlist_dir,
        }
    }

    fn out_dir_for(&self, bank: &Path) -> PathBuf {
        let stem = bank
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bank".to_string());
        self.playlist_dir.join(stem)
    }
}

fn lowercase_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// The descriptor naming the event, its id or one of its sound ids.
///
/// A bank matched only by its own name has no sound ids; its first descriptor is used.
pub fn select_playlist<'a>(
    playlists: &'a [PathBuf],
    candidate: &AudioCandidate,
    hit: &BankHit,
) -> Option<&'a PathBuf> {
    let event = candidate.name.to_lowercase();
    let id = candidate.hash.to_string();
    let sound_ids: Vec<String> = hit.sound_ids.iter().map(u32::to_string).collect();

    playlists
        .iter()
        .find(|playlist| {
            let stem = lowercase_stem(playlist);
            stem.contains(&event) || stem.contains(&id) || sound_ids.iter().any(|s| stem.contains(s))
        })
        .or_else(|| {
            if hit.sound_ids.is_empty() {
                playlists.first()
            } else {
                None
            }
        })
}

#[async_trait]
impl AudioStrategy for BankEventStrategy {
    fn origin(&self) -> AssetOrigin {
        AssetOrigin::BankDecoded
    }

    async fn attempt(&self, candidate: &AudioCandidate) -> Result<Option<AudioAsset>> {
        let hits = self.banks.lookup(candidate.hash);
        if hits.is_empty() {
            return Ok(None);
        }

        let _guard = self.cache.lock(candidate.hash).await;
        if let Some((path, format)) = self.cache.probe(candidate.hash).await {
            debug!(target: "audio", id = candidate.hash, "decoded by a concurrent request");
            return Ok(Some(asset(path, format, AssetOrigin::HashDirect, candidate)));
        }

        let mut last_error = None;
        for hit in hits {
            let out_dir = self.out_dir_for(&hit.bank);
            let playlists = match self.parser.playlists(&hit.bank, &out_dir).await {
                Ok(playlists) => playlists,
                Err(error) => {
                    warn!(target: "audio", bank = %hit.bank.display(), %error, "bank parse failed");
                    last_error = Some(AudioError::from(error));
                    continue;
                }
            };

            let Some(playlist) = select_playlist(&playlists, candidate, hit) else {
                debug!(
                    target: "audio",
                    bank = %hit.bank.display(),
                    event = %candidate.name,
                    "no descriptor names this event"
                );
                continue;
            };

            match decode_into_cache(&self.cache, self.transcoder.as_ref(), playlist, candidate, self.origin()).await {
                Ok(found) => return Ok(Some(found)),
                Err(error) => {
                    warn!(target: "audio", playlist = %playlist.display(), %error, "descriptor decode failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct AudioResolver {
    strategies: Vec<Box<dyn AudioStrategy>>,
    generator: CandidateGenerator,
}

impl std::fmt::Debug for AudioResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origins: Vec<AssetOrigin> = self.strategies.iter().map(|s| s.origin()).collect();
        f.debug_struct("AudioResolver")
            .field("strategies", &origins)
            .finish_non_exhaustive()
    }
}

impl AudioResolver {
    pub fn new(strategies: Vec<Box<dyn AudioStrategy>>, generator: CandidateGenerator) -> Self {
        Self {
            strategies,
            generator,
        }
    }

    /// Open the cache and scan the configured roots, then wire the default chain.
    pub async fn from_config(config: &AudioConfig) -> Result<Self> {
        let scan_config = config.clone();
        let (cache, sources, banks, event_map, event_index) = tokio::task::spawn_blocking(move || {
            let cache = AudioCache::from_config(&scan_config)?;
            let sources = match existing_dir(scan_config.source_root.as_deref(), "source_root") {
                Some(root) => SourceIndex::build(root)?,
                None => SourceIndex::default(),
            };
            let bank_root = existing_dir(scan_config.bank_root.as_deref(), "bank_root");
            let banks = match bank_root {
                Some(root) => BankIndex::build(root)?,
                None => BankIndex::default(),
            };
            let event_map = match &scan_config.event_map_path {
                Some(path) => EventMap::load(path)?,
                None => EventMap::default(),
            };
            let event_index = EventNameIndex::build(
                bank_root,
                Some(scan_config.playlist_dir().as_path()),
                event_map.names().map(str::to_string),
            );
            Ok::<_, AudioError>((cache, sources, banks, event_map, event_index))
        })
        .await
        .map_err(|e| AudioError::Task(e.to_string()))??;

        let cache = Arc::new(cache);
        let transcoder: Arc<dyn Transcoder> = Arc::new(VgmstreamTranscoder::new(config.transcoder.clone()));
        let parser: Arc<dyn BankParser> = Arc::new(WwiserBankParser::new(
            config.bank_parser.clone(),
            config.source_root.clone(),
            Some(config.language.clone()),
        ));

        info!(
            target: "audio",
            streams = sources.len(),
            banks = banks.bank_count(),
            mapped_keys = event_map.len(),
            event_names = event_index.len(),
            "audio resolver ready"
        );

        let strategies: Vec<Box<dyn AudioStrategy>> = vec![
            Box::new(HashDirectStrategy::new(Arc::clone(&cache))),
            Box::new(ExternalSourceStrategy::new(
                Arc::clone(&cache),
                Arc::new(sources),
                Arc::clone(&transcoder),
            )),
            Box::new(BankEventStrategy::new(
                cache,
                Arc::new(banks),
                parser,
                transcoder,
                config.playlist_dir(),
            )),
        ];
        let generator =
            CandidateGenerator::from_config(config, Arc::new(event_map)).with_event_index(Arc::new(event_index));
        Ok(Self::new(strategies, generator))
    }

    pub fn generator(&self) -> &CandidateGenerator {
        &self.generator
    }

    /// First asset produced for any candidate, or `None` when every strategy misses.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn resolve_candidates(&self, candidates: &[AudioCandidate]) -> Option<AudioAsset> {
        for candidate in candidates {
            for strategy in &self.strategies {
                match strategy.attempt(candidate).await {
                    Ok(Some(found)) => {
                        debug!(
                            target: "audio",
                            event = %candidate.name,
                            rule = ?candidate.rule,
                            origin = %found.origin,
                            "audio resolved"
                        );
                        return Some(found);
                    }
                    Ok(None) => {}
                    Err(error) => {
                        warn!(
                            target: "audio",
                            event = %candidate.name,
                            id = candidate.hash,
                            strategy = %strategy.origin(),
                            %error,
                            "audio strategy failed"
                        );
                    }
                }
            }
        }
        debug!(target: "audio", "no audio for any candidate");
        None
    }

    pub async fn resolve(&self, entry: &DatabaseEntry) -> Option<AudioAsset> {
        let candidates = self.generator.generate(entry);
        self.resolve_candidates(&candidates).await
    }
}

fn existing_dir<'a>(root: Option<&'a Path>, setting: &str) -> Option<&'a Path> {
    let root = root?;
    if root.is_dir() {
        Some(root)
    } else {
        warn!(target: "audio", setting, path = %root.display(), "configured directory does not exist, skipping");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::tests::synthetic_bank;
    use crate::error::ToolError;
    use crate::hash::hash_event_name;
    use lingocast_config::GenderPreference;
    use lingocast_domain::CandidateRule;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeTranscoder {
        calls: AtomicUsize,
        inputs: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn transcode(&self, input: &Path, output: &Path) -> std::result::Result<(), ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().expect("inputs lock").push(input.to_path_buf());
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                return Err(ToolError::Failed {
                    program: "fake".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "bad stream".to_string(),
                });
            }
            tokio::fs::write(output, b"RIFF----WAVE")
                .await
                .map_err(|source| ToolError::Io {
                    program: "fake".to_string(),
                    source,
                })
        }
    }

    struct FakeParser {
        names: Vec<&'static str>,
    }

    #[async_trait]
    impl BankParser for FakeParser {
        async fn playlists(&self, _bank: &Path, out_dir: &Path) -> std::result::Result<Vec<PathBuf>, ToolError> {
            std::fs::create_dir_all(out_dir).expect("out dir created");
            let mut produced = Vec::new();
            for name in &self.names {
                let path = out_dir.join(name);
                std::fs::write(&path, b"wem").expect("txtp written");
                produced.push(path);
            }
            Ok(produced)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        cache: Arc<AudioCache>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let root = dir.path().to_path_buf();
        let cache = AudioCache::open(&root.join("cache"), &root.join("cache").join("audio_index.json"), 0)
            .expect("cache should open");
        Fixture {
            _dir: dir,
            root,
            cache: Arc::new(cache),
        }
    }

    fn candidate(name: &str) -> AudioCandidate {
        AudioCandidate {
            name: name.to_string(),
            rule: CandidateRule::Template,
            hash: hash_event_name(name),
        }
    }

    fn generator() -> CandidateGenerator {
        CandidateGenerator::new(Vec::new(), GenderPreference::Female, Arc::new(EventMap::default()))
    }

    fn resolver(
        fx: &Fixture,
        sources: SourceIndex,
        banks: BankIndex,
        parser: FakeParser,
        transcoder: Arc<FakeTranscoder>,
    ) -> AudioResolver {
        let transcoder: Arc<dyn Transcoder> = transcoder;
        AudioResolver::new(
            vec![
                Box::new(HashDirectStrategy::new(Arc::clone(&fx.cache))),
                Box::new(ExternalSourceStrategy::new(
                    Arc::clone(&fx.cache),
                    Arc::new(sources),
                    Arc::clone(&transcoder),
                )),
                Box::new(BankEventStrategy::new(
                    Arc::clone(&fx.cache),
                    Arc::new(banks),
                    Arc::new(parser),
                    transcoder,
                    fx.root.join("txtp"),
                )),
            ],
            generator(),
        )
    }

    fn no_parser() -> FakeParser {
        FakeParser { names: Vec::new() }
    }

    #[tokio::test]
    async fn cached_file_is_served_without_decoding() {
        let fx = fixture();
        let wanted = candidate("vo_Main_LahaiRoi_3_1_1_2");
        std::fs::write(fx.cache.path_for(wanted.hash, AudioFormat::Ogg), b"OggS").expect("cached file written");

        let transcoder = Arc::new(FakeTranscoder::default());
        let resolver = resolver(&fx, SourceIndex::default(), BankIndex::default(), no_parser(), Arc::clone(&transcoder));

        let found = resolver.resolve_candidates(&[wanted]).await.expect("asset");
        assert_eq!(found.origin, AssetOrigin::HashDirect);
        assert_eq!(found.format, AudioFormat::Ogg);
        assert_eq!(found.cache_key, 1_580_911_979);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_decode_once() {
        let fx = fixture();
        let wanted = candidate("vo_hello");
        let streams = fx.root.join("streams");
        std::fs::create_dir_all(&streams).expect("streams dir created");
        std::fs::write(streams.join(format!("{}.wem", wanted.hash)), b"RIFF").expect("stream written");

        let transcoder = Arc::new(FakeTranscoder::default());
        let resolver = resolver(
            &fx,
            SourceIndex::build(&streams).expect("source index"),
            BankIndex::default(),
            no_parser(),
            Arc::clone(&transcoder),
        );

        let candidates = vec![wanted.clone()];
        let (first, second) = tokio::join!(
            resolver.resolve_candidates(&candidates),
            resolver.resolve_candidates(&candidates)
        );
        let first = first.expect("first request resolves");
        let second = second.expect("second request resolves");

        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.path, second.path);
        assert!(first.path.ends_with("2485258381.wav"));
        let origins = [first.origin, second.origin];
        assert!(origins.contains(&AssetOrigin::ExternalSource));
    }

    #[tokio::test]
    async fn bank_event_decodes_the_named_descriptor() {
        let fx = fixture();
        let wanted = candidate("vo_hello");
        let banks_root = fx.root.join("banks");
        std::fs::create_dir_all(&banks_root).expect("banks dir created");
        std::fs::write(banks_root.join("vo_dialogue.bnk"), synthetic_bank(134, wanted.hash, 777))
            .expect("bank written");

        let transcoder = Arc::new(FakeTranscoder::default());
        let resolver = resolver(
            &fx,
            SourceIndex::default(),
            BankIndex::build(&banks_root).expect("bank index"),
            FakeParser {
                names: vec!["vo_other.txtp", "vo_hello {s}.txtp"],
            },
            Arc::clone(&transcoder),
        );

        let found = resolver.resolve_candidates(&[wanted.clone()]).await.expect("asset");
        assert_eq!(found.origin, AssetOrigin::BankDecoded);
        assert_eq!(found.cache_key, wanted.hash);

        let inputs = transcoder.inputs.lock().expect("inputs lock").clone();
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].ends_with("vo_hello {s}.txtp"), "decoded {inputs:?}");
        assert!(inputs[0].starts_with(fx.root.join("txtp").join("vo_dialogue")));

        let again = resolver.resolve_candidates(&[wanted]).await.expect("cached asset");
        assert_eq!(again.origin, AssetOrigin::HashDirect);
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn descriptor_can_be_selected_by_sound_id() {
        let wanted = candidate("vo_hello");
        let hit = BankHit {
            bank: PathBuf::from("vo_dialogue.bnk"),
            sound_ids: vec![777],
        };
        let playlists = vec![PathBuf::from("a/vo_dialogue-0001 {777}.txtp"), PathBuf::from("a/zz.txtp")];
        assert_eq!(select_playlist(&playlists, &wanted, &hit), Some(&playlists[0]));

        let unrelated = vec![PathBuf::from("a/zz.txtp")];
        assert_eq!(select_playlist(&unrelated, &wanted, &hit), None);

        let by_name = BankHit {
            bank: PathBuf::from("vo_hello.bnk"),
            sound_ids: Vec::new(),
        };
        assert_eq!(select_playlist(&unrelated, &wanted, &by_name), Some(&unrelated[0]));
    }

    #[tokio::test]
    async fn failed_decode_falls_through_to_no_audio() {
        let fx = fixture();
        let wanted = candidate("vo_hello");
        let streams = fx.root.join("streams");
        std::fs::create_dir_all(&streams).expect("streams dir created");
        std::fs::write(streams.join(format!("{}.wem", wanted.hash)), b"RIFF").expect("stream written");

        let transcoder = Arc::new(FakeTranscoder {
            fail: true,
            ..FakeTranscoder::default()
        });
        let resolver = resolver(
            &fx,
            SourceIndex::build(&streams).expect("source index"),
            BankIndex::default(),
            no_parser(),
            Arc::clone(&transcoder),
        );

        assert!(resolver.resolve_candidates(&[wanted.clone()]).await.is_none());
        assert!(fx.cache.probe(wanted.hash).await.is_none());
        let leftovers: Vec<_> = std::fs::read_dir(fx.cache.dir())
            .expect("cache dir readable")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("partial.wav"))
            .collect();
        assert!(leftovers.is_empty(), "temporary files are removed");
    }

    #[tokio::test]
    async fn later_candidates_are_tried_after_misses() {
        let fx = fixture();
        let second = candidate("play_vo_hello");
        std::fs::write(fx.cache.path_for(second.hash, AudioFormat::Wav), b"RIFF").expect("cached file written");

        let resolver = resolver(
            &fx,
            SourceIndex::default(),
            BankIndex::default(),
            no_parser(),
            Arc::new(FakeTranscoder::default()),
        );

        let found = resolver
            .resolve_candidates(&[candidate("vo_hello"), second])
            .await
            .expect("asset");
        assert_eq!(found.event_name, "play_vo_hello");
        assert!(resolver.resolve_candidates(&[candidate("vo_missing")]).await.is_none());
    }

    #[tokio::test]
    async fn from_config_tolerates_missing_roots() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let config = AudioConfig {
            cache_dir: dir.path().join("cache"),
            source_root: Some(dir.path().join("absent-streams")),
            bank_root: Some(dir.path().join("absent-banks")),
            ..AudioConfig::default()
        };
        let resolver = AudioResolver::from_config(&config).await.expect("resolver builds");
        assert!(format!("{resolver:?}").contains("BankDecoded"));
        assert!(dir.path().join("cache").join("audio_index.json").is_file());
    }

    #[tokio::test]
    async fn from_config_indexes_bank_names_for_candidates() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let banks = dir.path().join("banks");
        std::fs::create_dir_all(&banks).expect("dir should be created");
        std::fs::write(banks.join("play_vo_side_light_02.bnk"), b"not a bank").expect("bank written");

        let config = AudioConfig {
            cache_dir: dir.path().join("cache"),
            bank_root: Some(banks),
            heuristic_prefixes: Vec::new(),
            ..AudioConfig::default()
        };
        let resolver = AudioResolver::from_config(&config).await.expect("resolver builds");

        let entry = DatabaseEntry {
            key: "whereisthelighthousekeeper".to_string(),
            matches: vec![lingocast_domain::Match {
                text_key: "Side_Light_02".to_string(),
                official_translation: "灯塔看守人在哪里？".to_string(),
                source_file: "SideText.json".to_string(),
                audio_rule: None,
                terms: Vec::new(),
                source_text: None,
                audio_event: None,
            }],
        };
        let candidates = resolver.generator().generate(&entry);
        assert_eq!(candidates[0].name, "play_vo_side_light_02");
        assert_eq!(candidates[0].rule, CandidateRule::Indexed);
    }
}
