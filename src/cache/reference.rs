//! In-memory reference cache
//!
//! Entries are keyed by song id and validated against the fingerprint of the
//! reference audio. Readers never block: the entry map is an immutable
//! snapshot swapped atomically on every change. Builds are deduplicated per
//! `(song_id, fingerprint)`: the first caller extracts, concurrent callers
//! for the same key wait and receive the same result.
//!
//! Reference extraction runs on a thread pool owned by the cache, never on
//! the caller's pool, so callers blocked on a build may be rayon workers.
//!
//! # Example
//!
//! ```no_run
//! use karaoke_scorer::cache::ReferenceCache;
//! use karaoke_scorer::AudioSignal;
//!
//! let cache = ReferenceCache::default();
//! let samples: Vec<f32> = (0..44100 * 30)
//!     .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin())
//!     .collect();
//! let reference = AudioSignal::new(samples, 44100)?;
//!
//! let contour = cache.get("song-42", &reference)?;
//! let again = cache.get("song-42", &reference)?;
//! assert!(std::sync::Arc::ptr_eq(&contour, &again));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use super::store::ContourStore;
use crate::config::{ExtractionConfig, NormalizationConfig, ScoringConfig};
use crate::error::{CacheBuildCause, CacheBuildError};
use crate::features::pitch::contour::NormalizedContour;
use crate::features::pitch::extractor::extract_with;
use crate::features::pitch::normalization::normalize_with;
use crate::io::fingerprint::Fingerprint;
use crate::io::signal::AudioSignal;
use arc_swap::ArcSwap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::SystemTime;

/// Analysis parameters a reference contour was built with
///
/// A stored contour is only reused by a cache configured identically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Pitch extraction parameters
    pub extraction: ExtractionConfig,

    /// Pitch normalization parameters
    pub normalization: NormalizationConfig,
}

/// Analyzed reference of one song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCacheEntry {
    /// Song the reference belongs to
    pub song_id: String,

    /// Fingerprint of the audio the contour was built from
    pub fingerprint: Fingerprint,

    /// Parameters of the analysis
    pub settings: AnalysisSettings,

    /// Normalized reference contour
    pub contour: Arc<NormalizedContour>,

    /// When the analysis ran
    pub built_at: SystemTime,
}

/// Map slot: an entry tagged with the build generation that produced it
#[derive(Clone)]
struct Cached {
    generation: u64,
    entry: Arc<ReferenceCacheEntry>,
}

type BuildKey = (String, Fingerprint);
type BuildResult = Result<Arc<ReferenceCacheEntry>, CacheBuildError>;

/// A build in progress; waiters block on `ready` until `result` is set
struct InFlight {
    result: Mutex<Option<BuildResult>>,
    ready: Condvar,
}

impl InFlight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> BuildResult {
        let mut result = self.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut result);
        }
    }
}

/// Shared cache of analyzed reference vocals
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ReferenceCache {
    settings: AnalysisSettings,
    entries: ArcSwap<HashMap<String, Cached>>,
    in_flight: Mutex<HashMap<BuildKey, Arc<InFlight>>>,
    store: Option<Box<dyn ContourStore>>,
    build_pool: Option<rayon::ThreadPool>,
    generations: AtomicU64,
    builds: AtomicUsize,
}

impl fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("entries", &self.len())
            .field("in_flight", &self.in_flight.lock().len())
            .field("builds", &self.build_count())
            .field("persistent", &self.store.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new(ExtractionConfig::default(), NormalizationConfig::default())
    }
}

impl ReferenceCache {
    /// Empty cache analyzing references with the given parameters
    ///
    /// If the dedicated build pool cannot be started, references are
    /// extracted on the calling thread instead.
    pub fn new(extraction: ExtractionConfig, normalization: NormalizationConfig) -> Self {
        let build_pool = match rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("reference-build-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Reference build pool unavailable, building inline: {}", e);
                None
            }
        };

        Self {
            settings: AnalysisSettings {
                extraction,
                normalization,
            },
            entries: ArcSwap::from_pointee(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            store: None,
            build_pool,
            generations: AtomicU64::new(0),
            builds: AtomicUsize::new(0),
        }
    }

    /// Empty cache using the extraction and normalization parts of `config`
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(config.extraction.clone(), config.normalization.clone())
    }

    /// Back the cache with a persistent store
    ///
    /// Builds first try the store; fresh analyses are written to it.
    pub fn with_store(mut self, store: impl ContourStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Parameters references are analyzed with
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Normalized reference contour for `song_id`, building it if needed
    ///
    /// # Errors
    ///
    /// `CacheBuildError` if the reference audio cannot be analyzed. Every
    /// caller waiting on the same build receives the same error; nothing is
    /// cached, so a later call retries.
    pub fn get(
        &self,
        song_id: &str,
        reference: &AudioSignal,
    ) -> Result<Arc<NormalizedContour>, CacheBuildError> {
        self.get_entry(song_id, reference)
            .map(|entry| Arc::clone(&entry.contour))
    }

    /// Cache entry for `song_id`, building it if needed
    ///
    /// See [`get`](Self::get) for the error contract.
    pub fn get_entry(
        &self,
        song_id: &str,
        reference: &AudioSignal,
    ) -> Result<Arc<ReferenceCacheEntry>, CacheBuildError> {
        self.get_fingerprinted(song_id, Fingerprint::of_signal(reference), reference)
    }

    /// [`get_entry`](Self::get_entry) with the fingerprint already computed
    pub(crate) fn get_fingerprinted(
        &self,
        song_id: &str,
        fingerprint: Fingerprint,
        reference: &AudioSignal,
    ) -> Result<Arc<ReferenceCacheEntry>, CacheBuildError> {
        if let Some(entry) = self.lookup(song_id, &fingerprint) {
            log::debug!("Reference cache hit: '{}' ({})", song_id, fingerprint);
            return Ok(entry);
        }

        let key = (song_id.to_string(), fingerprint);
        let (flight, generation) = {
            let mut in_flight = self.in_flight.lock();
            // A build may have finished between the lookup and the lock
            if let Some(entry) = self.lookup(song_id, &key.1) {
                return Ok(entry);
            }
            match in_flight.get(&key) {
                Some(flight) => (Arc::clone(flight), None),
                None => {
                    let flight = Arc::new(InFlight::new());
                    in_flight.insert(key.clone(), Arc::clone(&flight));
                    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                    (flight, Some(generation))
                }
            }
        };

        let Some(generation) = generation else {
            log::debug!("Waiting for in-flight build of '{}' ({})", song_id, key.1);
            return flight.wait();
        };

        let mut guard = BuildGuard {
            cache: self,
            key: &key,
            generation,
            flight: &flight,
            published: false,
        };
        let result = self.build(song_id, &key.1, reference);
        guard.publish(result.clone());
        result
    }

    /// Drop the entry of `song_id`; returns whether one existed
    pub fn invalidate(&self, song_id: &str) -> bool {
        let previous = self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(song_id);
            next
        });
        let removed = previous.contains_key(song_id);
        if removed {
            log::debug!("Invalidated reference cache entry '{}'", song_id);
        }
        removed
    }

    /// Number of cached songs
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Number of reference extractions run so far (store loads excluded)
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn lookup(&self, song_id: &str, fingerprint: &Fingerprint) -> Option<Arc<ReferenceCacheEntry>> {
        self.entries
            .load()
            .get(song_id)
            .filter(|cached| cached.entry.fingerprint == *fingerprint)
            .map(|cached| Arc::clone(&cached.entry))
    }

    fn build(
        &self,
        song_id: &str,
        fingerprint: &Fingerprint,
        reference: &AudioSignal,
    ) -> BuildResult {
        if let Some(store) = &self.store {
            match store.load(song_id, fingerprint, &self.settings) {
                Ok(Some(entry)) if entry.settings == self.settings => {
                    log::info!("Loaded reference '{}' ({}) from store", song_id, fingerprint);
                    return Ok(Arc::new(entry));
                }
                Ok(Some(_)) => {
                    log::debug!("Stored reference '{}' uses other settings, rebuilding", song_id)
                }
                Ok(None) => {}
                Err(e) => log::warn!("Reference store load failed for '{}': {}", song_id, e),
            }
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        log::info!(
            "Building reference '{}' ({}): {:.1}s of audio",
            song_id,
            fingerprint,
            reference.duration_sec()
        );

        let normalized = self.analyze(reference).map_err(|cause| CacheBuildError {
            song_id: song_id.to_string(),
            fingerprint: fingerprint.as_str().to_string(),
            cause,
        })?;

        let entry = ReferenceCacheEntry {
            song_id: song_id.to_string(),
            fingerprint: fingerprint.clone(),
            settings: self.settings.clone(),
            contour: Arc::new(normalized),
            built_at: SystemTime::now(),
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&entry) {
                log::warn!("Reference store save failed for '{}': {}", song_id, e);
            }
        }

        log::debug!(
            "Reference '{}' built: {} frames, {} voiced",
            song_id,
            entry.contour.len(),
            entry.contour.voiced_count()
        );
        Ok(Arc::new(entry))
    }

    /// Extract and normalize on the build pool, blocking until done
    ///
    /// The wait is a plain channel receive, so a caller on a rayon worker
    /// does not pick up unrelated jobs while the reference is analyzed.
    fn analyze(&self, reference: &AudioSignal) -> Result<NormalizedContour, CacheBuildCause> {
        let settings = self.settings.clone();
        let run = move |signal: &AudioSignal| {
            extract_with(signal, &settings.extraction)
                .map(|contour| normalize_with(&contour, &settings.normalization))
                .map_err(CacheBuildCause::Extraction)
        };

        let Some(pool) = &self.build_pool else {
            return run(reference);
        };

        let (tx, rx) = mpsc::channel();
        let signal = reference.clone();
        pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&signal)));
            let _ = tx.send(outcome);
        });

        match rx.recv() {
            Ok(Ok(result)) => result,
            // Surface the panic in the leader so its guard reports the abandonment
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(CacheBuildCause::Abandoned),
        }
    }

    /// Install a finished build and wake its waiters
    ///
    /// An entry from a newer build generation is never replaced by an
    /// older build that finished later.
    fn publish(&self, key: &BuildKey, generation: u64, flight: &InFlight, result: BuildResult) {
        if let Ok(entry) = &result {
            let previous = self.entries.rcu(|current| {
                let mut next = HashMap::clone(current);
                let superseded = next
                    .get(&key.0)
                    .map_or(false, |cached| cached.generation > generation);
                if !superseded {
                    next.insert(
                        key.0.clone(),
                        Cached {
                            generation,
                            entry: Arc::clone(entry),
                        },
                    );
                }
                next
            });
            if let Some(newer) = previous
                .get(&key.0)
                .filter(|cached| cached.generation > generation)
            {
                log::debug!(
                    "Build of '{}' ({}) superseded by {}",
                    key.0,
                    key.1,
                    newer.entry.fingerprint
                );
            }
        }
        self.in_flight.lock().remove(key);
        *flight.result.lock() = Some(result);
        flight.ready.notify_all();
    }
}

/// Publishes an abandonment error if the building caller unwinds
struct BuildGuard<'a> {
    cache: &'a ReferenceCache,
    key: &'a BuildKey,
    generation: u64,
    flight: &'a InFlight,
    published: bool,
}

impl BuildGuard<'_> {
    fn publish(&mut self, result: BuildResult) {
        self.published = true;
        self.cache.publish(self.key, self.generation, self.flight, result);
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.published {
            log::warn!("Reference build of '{}' abandoned", self.key.0);
            let error = CacheBuildError {
                song_id: self.key.0.clone(),
                fingerprint: self.key.1.as_str().to_string(),
                cause: CacheBuildCause::Abandoned,
            };
            self.cache
                .publish(self.key, self.generation, self.flight, Err(error));
        }
    }
}
