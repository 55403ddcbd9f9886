//! Persistent storage of analyzed references
//!
//! A store lets a restarted process skip re-analyzing reference vocals.
//! Entries are only trusted when the song id, the fingerprint of the
//! current reference audio and the analysis settings all match what was
//! stored.

use super::reference::{AnalysisSettings, ReferenceCacheEntry};
use crate::io::fingerprint::Fingerprint;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Backing storage for [`ReferenceCache`](super::ReferenceCache)
pub trait ContourStore: Send + Sync {
    /// Stored entry for `song_id` built from audio with `fingerprint` using `settings`
    ///
    /// Returns `Ok(None)` when nothing usable is stored, including entries
    /// built from different audio or with different analysis settings.
    fn load(
        &self,
        song_id: &str,
        fingerprint: &Fingerprint,
        settings: &AnalysisSettings,
    ) -> io::Result<Option<ReferenceCacheEntry>>;

    /// Persist an entry, replacing any previous one for the same song
    fn save(&self, entry: &ReferenceCacheEntry) -> io::Result<()>;
}

/// One JSON file per song in a directory
///
/// Files are named `<song id>_cache.json`, with characters outside
/// `[A-Za-z0-9._-]` replaced by `_`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `dir`, created if missing
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the cache files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File an entry for `song_id` is stored in
    pub fn path_for(&self, song_id: &str) -> PathBuf {
        let name: String = song_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}_cache.json", name))
    }
}

impl ContourStore for JsonFileStore {
    fn load(
        &self,
        song_id: &str,
        fingerprint: &Fingerprint,
        settings: &AnalysisSettings,
    ) -> io::Result<Option<ReferenceCacheEntry>> {
        let path = self.path_for(song_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let entry: ReferenceCacheEntry = serde_json::from_slice(&bytes)?;
        if entry.song_id != song_id {
            log::debug!(
                "Ignoring {}: stored for song '{}', not '{}'",
                path.display(),
                entry.song_id,
                song_id
            );
            return Ok(None);
        }
        if entry.fingerprint != *fingerprint {
            log::debug!(
                "Ignoring stale {}: fingerprint {} != {}",
                path.display(),
                entry.fingerprint,
                fingerprint
            );
            return Ok(None);
        }
        if entry.settings != *settings {
            log::debug!(
                "Ignoring {}: analyzed with different settings",
                path.display()
            );
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn save(&self, entry: &ReferenceCacheEntry) -> io::Result<()> {
        let path = self.path_for(&entry.song_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(entry)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        log::debug!("Saved reference '{}' to {}", entry.song_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ReferenceCache;
    use crate::config::{ExtractionConfig, NormalizationConfig};
    use crate::features::pitch::contour::{PitchContour, Voicing};
    use crate::features::pitch::normalization::normalize;
    use crate::io::signal::AudioSignal;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn entry(song_id: &str, fingerprint: &Fingerprint) -> ReferenceCacheEntry {
        let contour = PitchContour::from_voicing(
            0.01,
            vec![
                Voicing::Voiced { frequency_hz: 440.0 },
                Voicing::Unvoiced,
                Voicing::Voiced { frequency_hz: 261.63 },
            ],
        );
        ReferenceCacheEntry {
            song_id: song_id.to_string(),
            fingerprint: fingerprint.clone(),
            settings: AnalysisSettings::default(),
            contour: Arc::new(normalize(&contour)),
            built_at: SystemTime::now(),
        }
    }

    fn defaults() -> AnalysisSettings {
        AnalysisSettings::default()
    }

    fn tone() -> AudioSignal {
        let samples = (0..44100 / 3)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin())
            .collect();
        AudioSignal::new(samples, 44100).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let fingerprint = Fingerprint::of_bytes(b"v1");
        let saved = entry("song", &fingerprint);

        store.save(&saved).unwrap();
        let loaded = store.load("song", &fingerprint, &defaults()).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.path_for("song").ends_with("song_cache.json"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        assert!(store
            .load("nothing", &Fingerprint::of_bytes(b"x"), &defaults())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_stale_fingerprint_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        store.save(&entry("song", &Fingerprint::of_bytes(b"v1"))).unwrap();
        assert!(store
            .load("song", &Fingerprint::of_bytes(b"v2"), &defaults())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sanitized_name_collision_checked() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let fingerprint = Fingerprint::of_bytes(b"v1");
        store.save(&entry("a/b", &fingerprint)).unwrap();

        assert_eq!(store.path_for("a/b"), store.path_for("a_b"));
        assert!(store.load("a_b", &fingerprint, &defaults()).unwrap().is_none());
        assert!(store.load("a/b", &fingerprint, &defaults()).unwrap().is_some());
    }

    #[test]
    fn test_different_settings_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        let fingerprint = Fingerprint::of_bytes(b"v1");
        store.save(&entry("song", &fingerprint)).unwrap();

        let coarser = AnalysisSettings {
            extraction: ExtractionConfig {
                hop_sec: 512.0 / 44100.0,
                ..ExtractionConfig::default()
            },
            ..AnalysisSettings::default()
        };
        assert!(store.load("song", &fingerprint, &coarser).unwrap().is_none());

        let smoothed = AnalysisSettings {
            normalization: NormalizationConfig { smoothing: true },
            ..AnalysisSettings::default()
        };
        assert!(store.load("song", &fingerprint, &smoothed).unwrap().is_none());
        assert!(store.load("song", &fingerprint, &defaults()).unwrap().is_some());
    }

    #[test]
    fn test_cache_with_other_hop_rebuilds_stored_reference() {
        let dir = tempfile::tempdir().unwrap();
        let reference = tone();

        let first = ReferenceCache::default().with_store(JsonFileStore::new(dir.path()).unwrap());
        first.get("song", &reference).unwrap();

        let hop_sec = 512.0 / 44100.0;
        let second = ReferenceCache::new(
            ExtractionConfig {
                hop_sec,
                ..ExtractionConfig::default()
            },
            NormalizationConfig::default(),
        )
        .with_store(JsonFileStore::new(dir.path()).unwrap());
        let rebuilt = second.get("song", &reference).unwrap();

        assert_eq!(second.build_count(), 1);
        assert!((rebuilt.hop_sec - hop_sec).abs() < 1e-9);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        fs::write(store.path_for("song"), b"{ not json").unwrap();
        assert!(store
            .load("song", &Fingerprint::of_bytes(b"v1"), &defaults())
            .is_err());
    }

    #[test]
    fn test_cache_reuses_stored_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let reference = tone();

        let first = ReferenceCache::default().with_store(JsonFileStore::new(dir.path()).unwrap());
        let built = first.get("song", &reference).unwrap();
        assert_eq!(first.build_count(), 1);

        // Fresh process: loads instead of extracting
        let second = ReferenceCache::default().with_store(JsonFileStore::new(dir.path()).unwrap());
        let loaded = second.get("song", &reference).unwrap();
        assert_eq!(second.build_count(), 0);
        assert_eq!(*loaded, *built);
    }

    #[test]
    fn test_corrupt_store_falls_back_to_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).unwrap();
        fs::write(store.path_for("song"), b"garbage").unwrap();

        let reference = tone();

        let cache = ReferenceCache::default().with_store(store);
        assert!(cache.get("song", &reference).is_ok());
        assert_eq!(cache.build_count(), 1);
    }
}
