//! Integration tests for the scoring engine

use karaoke_scorer::features::pitch::contour::{PitchContour, Voicing};
use karaoke_scorer::features::pitch::normalization::normalize;
use karaoke_scorer::{
    AudioSignal, JsonFileStore, NormalizedContour, ReferenceCache, ScoringConfig, ScoringEngine,
    ScoringError,
};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SAMPLE_RATE: u32 = 44100;

/// Load a WAV file as a mono signal
fn load_wav(path: &Path) -> Result<AudioSignal, Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioSignal::from_interleaved(
        &samples,
        spec.channels as usize,
        spec.sample_rate,
    )?)
}

/// Write mono samples as a 16-bit WAV, duplicated across `channels`
fn write_wav(dir: &Path, name: &str, samples: &[f32], channels: u16) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &s in samples {
        for _ in 0..channels {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

/// Sung melody: each note held for `note_sec`, as (frequency Hz or rest)
fn melody(notes: &[Option<f32>], note_sec: f32) -> Vec<f32> {
    let note_len = (note_sec * SAMPLE_RATE as f32) as usize;
    let mut samples = Vec::with_capacity(notes.len() * note_len);
    let mut phase = 0.0f32;
    for note in notes {
        for _ in 0..note_len {
            match note {
                Some(freq) => {
                    samples.push(0.5 * phase.sin());
                    phase = (phase + 2.0 * PI * freq / SAMPLE_RATE as f32) % (2.0 * PI);
                }
                None => samples.push(0.0),
            }
        }
    }
    samples
}

/// C major arpeggio at octave 3
fn reference_notes() -> Vec<Option<f32>> {
    [130.81, 164.81, 196.0, 220.0, 196.0, 164.81, 130.81, 146.83]
        .iter()
        .map(|&f| Some(f))
        .collect()
}

fn contour(classes: &[Option<f32>], octave_shift: i32) -> NormalizedContour {
    let voicing = classes.iter().map(|pc| match pc {
        Some(pc) => Voicing::Voiced {
            frequency_hz: 261.6256 * 2.0f32.powf(pc / 12.0 + octave_shift as f32),
        },
        None => Voicing::Unvoiced,
    });
    normalize(&PitchContour::from_voicing(256.0 / 44100.0, voicing))
}

fn engine() -> ScoringEngine {
    ScoringEngine::new(ScoringConfig::default()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_contours_score_100() {
        let classes: Vec<Option<f32>> = (0..100).map(|i| Some([0.0, 4.0, 7.0][i % 3])).collect();
        let reference = contour(&classes, 0);
        let breakdown = engine().score_contours(&reference, &reference).unwrap();

        assert_eq!(breakdown.final_score, 100);
        assert!((breakdown.pitch_accuracy - 1.0).abs() < 1e-4);
        assert_eq!(breakdown.timing_alignment, 1.0);
        assert_eq!(breakdown.voiced_overlap, 1.0);
    }

    #[test]
    fn test_octave_shifted_and_stretched_contour() {
        let pattern = [0.0, 4.0, 7.0];
        let reference: Vec<Option<f32>> = (0..100).map(|i| Some(pattern[i % 3])).collect();
        // 10% slower: every frame of the performance maps back to frame j * 100 / 110
        let stretched: Vec<Option<f32>> = (0..110).map(|j| reference[j * 100 / 110]).collect();

        let breakdown = engine()
            .score_contours(&contour(&reference, 0), &contour(&stretched, 1))
            .unwrap();

        assert!(breakdown.pitch_accuracy > 0.99, "{:?}", breakdown);
        assert_eq!(breakdown.voiced_overlap, 1.0);
        assert!(breakdown.timing_alignment > 0.6 && breakdown.timing_alignment < 1.0);
        assert!(
            breakdown.final_score >= 70 && breakdown.final_score < 100,
            "{:?}",
            breakdown
        );
    }

    #[test]
    fn test_half_sung_contour() {
        let classes: Vec<Option<f32>> = (0..100).map(|i| Some([0.0, 4.0, 7.0][i % 3])).collect();
        let mut half = classes.clone();
        half[50..].iter_mut().for_each(|c| *c = None);

        let engine = engine();
        let full = engine
            .score_contours(&contour(&classes, 0), &contour(&classes, 0))
            .unwrap();
        let breakdown = engine
            .score_contours(&contour(&classes, 0), &contour(&half, 0))
            .unwrap();

        assert!((breakdown.voiced_overlap - 0.5).abs() < 0.05, "{:?}", breakdown);
        let ratio = breakdown.final_score as f32 / full.final_score as f32;
        assert!(ratio > 0.3 && ratio < 0.6, "ratio = {}", ratio);
    }

    #[test]
    fn test_unvoiced_contour_scores_at_most_5() {
        let classes: Vec<Option<f32>> = (0..100).map(|i| Some((i % 12) as f32)).collect();
        let breakdown = engine()
            .score_contours(&contour(&classes, 0), &contour(&[None; 100], 0))
            .unwrap();
        assert!(breakdown.final_score <= 5);
    }

    #[test]
    fn test_score_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        let reference_path = write_wav(dir.path(), "reference.wav", &melody(&reference_notes(), 0.25), 1);
        // Same song sung an octave up, on a stereo recorder
        let octave_up: Vec<Option<f32>> = reference_notes()
            .iter()
            .map(|n| n.map(|f| f * 2.0))
            .collect();
        let performance_path = write_wav(dir.path(), "performance.wav", &melody(&octave_up, 0.25), 2);

        let reference = load_wav(&reference_path).unwrap();
        let performance = load_wav(&performance_path).unwrap();
        assert_eq!(reference.len(), performance.len());

        let engine = engine();
        let own = engine.score("arpeggio", &reference, &reference).unwrap();
        let breakdown = engine.score("arpeggio", &reference, &performance).unwrap();

        assert_eq!(own.final_score, 100);
        assert!(breakdown.final_score >= 85, "{:?}", breakdown);
        assert!(breakdown.pitch_accuracy > 0.85);
        assert_eq!(engine.cache().build_count(), 1);
    }

    #[test]
    fn test_slower_performance_audio() {
        let reference = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();
        let octave_up: Vec<Option<f32>> = reference_notes()
            .iter()
            .map(|n| n.map(|f| f * 2.0))
            .collect();
        let slower = AudioSignal::new(melody(&octave_up, 0.375), SAMPLE_RATE).unwrap();

        let breakdown = engine().score("arpeggio", &reference, &slower).unwrap();

        assert!(breakdown.pitch_accuracy > 0.85, "{:?}", breakdown);
        assert!(breakdown.voiced_overlap > 0.85, "{:?}", breakdown);
        assert!(breakdown.timing_alignment > 0.6 && breakdown.timing_alignment < 1.0);
        assert!(breakdown.final_score >= 70, "{:?}", breakdown);
    }

    #[test]
    fn test_half_sung_audio() {
        let notes = reference_notes();
        let mut half = notes.clone();
        half[4..].iter_mut().for_each(|n| *n = None);

        let reference = AudioSignal::new(melody(&notes, 0.25), SAMPLE_RATE).unwrap();
        let performance = AudioSignal::new(melody(&half, 0.25), SAMPLE_RATE).unwrap();

        let engine = engine();
        let full = engine.score("arpeggio", &reference, &reference).unwrap();
        let breakdown = engine.score("arpeggio", &reference, &performance).unwrap();

        assert!((breakdown.voiced_overlap - 0.5).abs() < 0.1, "{:?}", breakdown);
        assert!(breakdown.final_score < full.final_score * 6 / 10);
        assert!(breakdown.final_score > full.final_score / 4);
    }

    #[test]
    fn test_silent_and_noise_performances() {
        let engine = engine();
        let reference = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();

        let silent = AudioSignal::new(vec![0.0; 2 * SAMPLE_RATE as usize], SAMPLE_RATE).unwrap();
        assert!(matches!(
            engine.score("arpeggio", &reference, &silent),
            Err(ScoringError::Extraction(_))
        ));
        assert_eq!(engine.score_or_zero("arpeggio", &reference, &silent).final_score, 0);

        // Deterministic white-ish noise from an LCG
        let mut state = 0x2545_f491u32;
        let noise: Vec<f32> = (0..2 * SAMPLE_RATE as usize)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 0.6 - 0.3
            })
            .collect();
        let noise = AudioSignal::new(noise, SAMPLE_RATE).unwrap();
        let breakdown = engine.score("arpeggio", &reference, &noise).unwrap();
        assert!(breakdown.final_score <= 5, "{:?}", breakdown);
    }

    #[test]
    fn test_too_short_performance() {
        let engine = engine();
        let reference = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();
        let blip = AudioSignal::new(vec![0.1; 100], SAMPLE_RATE).unwrap();
        assert!(matches!(
            engine.score("arpeggio", &reference, &blip),
            Err(ScoringError::Extraction(_))
        ));
    }

    #[test]
    fn test_engines_share_cache_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let reference = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();

        let cache = Arc::new(
            ReferenceCache::default().with_store(JsonFileStore::new(dir.path()).unwrap()),
        );
        let a = ScoringEngine::with_cache(ScoringConfig::default(), Arc::clone(&cache)).unwrap();
        let b = ScoringEngine::with_cache(ScoringConfig::default(), Arc::clone(&cache)).unwrap();

        let first = a.score("song", &reference, &reference).unwrap();
        let second = b.score("song", &reference, &reference).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.build_count(), 1);
        assert!(dir.path().join("song_cache.json").exists());

        // A restarted service picks the analysis up from disk
        let restarted = ReferenceCache::default().with_store(JsonFileStore::new(dir.path()).unwrap());
        restarted.get("song", &reference).unwrap();
        assert_eq!(restarted.build_count(), 0);
    }

    #[test]
    fn test_changed_reference_rebuilds_once() {
        let engine = engine();
        let v1 = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();
        let mut remastered = melody(&reference_notes(), 0.25);
        remastered.iter_mut().for_each(|s| *s *= 0.8);
        let v2 = AudioSignal::new(remastered, SAMPLE_RATE).unwrap();

        engine.score("song", &v1, &v1).unwrap();
        engine.score("song", &v1, &v1).unwrap();
        assert_eq!(engine.cache().build_count(), 1);

        engine.score("song", &v2, &v1).unwrap();
        engine.score("song", &v2, &v1).unwrap();
        assert_eq!(engine.cache().build_count(), 2);
    }

    #[test]
    fn test_config_from_json() {
        let config = ScoringConfig::from_json(
            r#"{
                "alignment": { "compensate_offset": true },
                "normalization": { "smoothing": true }
            }"#,
        )
        .unwrap();
        let engine = ScoringEngine::new(config).unwrap();
        let reference = AudioSignal::new(melody(&reference_notes(), 0.25), SAMPLE_RATE).unwrap();
        let breakdown = engine.score("song", &reference, &reference).unwrap();
        assert_eq!(breakdown.final_score, 100);
    }
}
