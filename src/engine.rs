//! Scoring pipeline
//!
//! Reference audio → cached contour ─┐
//!                                    ├→ alignment → metrics → score
//! Performance audio → contour ──────┘
//!
//! The engine owns no mutable state besides the shared reference cache, so
//! one engine serves any number of concurrent requests.

use crate::analysis::metrics::compute_metrics;
use crate::analysis::result::ScoreBreakdown;
use crate::analysis::score::synthesize;
use crate::cache::ReferenceCache;
use crate::config::ScoringConfig;
use crate::error::CacheBuildError;
use crate::error::{AlignmentError, ScoringError};
use crate::features::alignment::dtw::align_with;
use crate::features::alignment::offset::{estimate_offset, shift_contour};
use crate::features::pitch::contour::NormalizedContour;
use crate::features::pitch::extractor::extract_with;
use crate::features::pitch::normalization::normalize_with;
use crate::io::fingerprint::Fingerprint;
use crate::io::signal::AudioSignal;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Largest relative difference between the frame hops of two aligned contours
///
/// Rounding the hop to whole samples at different sample rates moves it by
/// well under this.
const HOP_TOLERANCE: f64 = 0.01;

type ResolvedReference = Result<Arc<NormalizedContour>, CacheBuildError>;

/// One scoring job of a batch
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    /// Song the reference belongs to (cache key)
    pub song_id: String,
    /// Reference vocal track
    pub reference: AudioSignal,
    /// Player recording
    pub performance: AudioSignal,
}

/// Scores performances against cached reference analyses
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    cache: Arc<ReferenceCache>,
}

impl ScoringEngine {
    /// Engine with its own reference cache
    ///
    /// # Errors
    ///
    /// `ScoringError::InvalidConfig` if `config` fails validation.
    pub fn new(config: ScoringConfig) -> Result<Self, ScoringError> {
        let cache = Arc::new(ReferenceCache::from_config(&config));
        Self::with_cache(config, cache)
    }

    /// Engine sharing an existing cache
    ///
    /// # Errors
    ///
    /// `ScoringError::InvalidConfig` if `config` fails validation, or if the
    /// cache analyzes references with other extraction or normalization
    /// settings than the engine uses for performances.
    pub fn with_cache(
        config: ScoringConfig,
        cache: Arc<ReferenceCache>,
    ) -> Result<Self, ScoringError> {
        config.validate()?;
        let settings = cache.settings();
        if settings.extraction != config.extraction || settings.normalization != config.normalization
        {
            return Err(ScoringError::InvalidConfig(format!(
                "Cache analyzes references with different settings (hop {:.6}s, smoothing {}) \
                 than the engine (hop {:.6}s, smoothing {})",
                settings.extraction.hop_sec,
                settings.normalization.smoothing,
                config.extraction.hop_sec,
                config.normalization.smoothing
            )));
        }
        Ok(Self { config, cache })
    }

    /// Active configuration
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Shared reference cache
    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    /// Score a performance against the reference of `song_id`
    ///
    /// # Errors
    ///
    /// * `ScoringError::CacheBuild` - the reference could not be analyzed
    /// * `ScoringError::Extraction` - the performance holds no pitch data
    ///   (too short, or silent throughout)
    /// * `ScoringError::Alignment` - a contour came out empty
    pub fn score(
        &self,
        song_id: &str,
        reference: &AudioSignal,
        performance: &AudioSignal,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let start_time = Instant::now();

        let reference = self.cache.get(song_id, reference)?;
        let breakdown = self.score_against(&reference, performance)?;

        log::debug!(
            "Scored '{}' in {:.1} ms: {}",
            song_id,
            start_time.elapsed().as_secs_f32() * 1000.0,
            breakdown.final_score
        );
        Ok(breakdown)
    }

    /// Extract the performance and score it against an analyzed reference
    fn score_against(
        &self,
        reference: &NormalizedContour,
        performance: &AudioSignal,
    ) -> Result<ScoreBreakdown, ScoringError> {
        let contour = extract_with(performance, &self.config.extraction)?;
        let performance = normalize_with(&contour, &self.config.normalization);
        Ok(self.score_contours(reference, &performance)?)
    }

    /// Score two already normalized contours
    ///
    /// A performance without a single voiced frame scores 0; its metrics
    /// are still reported.
    ///
    /// # Errors
    ///
    /// * `AlignmentError::EmptySequence` - a contour has no frames
    /// * `AlignmentError::HopMismatch` - the frame hops differ by more than 1%
    pub fn score_contours(
        &self,
        reference: &NormalizedContour,
        performance: &NormalizedContour,
    ) -> Result<ScoreBreakdown, AlignmentError> {
        let (reference_hop_sec, performance_hop_sec) = (reference.hop_sec, performance.hop_sec);
        if (reference_hop_sec - performance_hop_sec).abs()
            > HOP_TOLERANCE * reference_hop_sec.abs().max(performance_hop_sec.abs())
        {
            return Err(AlignmentError::HopMismatch {
                reference_hop_sec,
                performance_hop_sec,
            });
        }

        let shifted;
        let performance = if self.config.alignment.compensate_offset {
            let offset = estimate_offset(reference, performance);
            shifted = shift_contour(performance, offset);
            &shifted
        } else {
            performance
        };

        let alignment = align_with(reference, performance, &self.config.alignment)?;
        let metrics = compute_metrics(reference, performance, &alignment);

        if performance.voiced_count() == 0 {
            log::warn!("No vocal input detected in performance");
            return Ok(ScoreBreakdown::from_metrics(metrics, 0));
        }

        Ok(synthesize(&metrics, &self.config.weights))
    }

    /// Like [`score`](Self::score), resolving every error to a zero score
    pub fn score_or_zero(
        &self,
        song_id: &str,
        reference: &AudioSignal,
        performance: &AudioSignal,
    ) -> ScoreBreakdown {
        match self.score(song_id, reference, performance) {
            Ok(breakdown) => breakdown,
            Err(e) => {
                log::warn!("Scoring '{}' failed, defaulting to 0: {}", song_id, e);
                ScoreBreakdown::zero()
            }
        }
    }

    /// Score independent requests in parallel
    ///
    /// Results are in request order. References are resolved through the
    /// cache first, one distinct `(song_id, fingerprint)` at a time; the
    /// parallel phase then only extracts performances and aligns.
    pub fn score_batch(
        &self,
        requests: &[ScoreRequest],
    ) -> Vec<Result<ScoreBreakdown, ScoringError>> {
        let start_time = Instant::now();
        log::debug!("Scoring batch of {} requests", requests.len());

        let fingerprints: Vec<Fingerprint> = requests
            .par_iter()
            .map(|request| Fingerprint::of_signal(&request.reference))
            .collect();

        let mut references: HashMap<(&str, &Fingerprint), ResolvedReference> = HashMap::new();
        for (request, fingerprint) in requests.iter().zip(fingerprints.iter()) {
            references
                .entry((request.song_id.as_str(), fingerprint))
                .or_insert_with(|| {
                    self.cache
                        .get_fingerprinted(&request.song_id, fingerprint.clone(), &request.reference)
                        .map(|entry| Arc::clone(&entry.contour))
                });
        }
        log::debug!(
            "Resolved {} references in {:.1} ms",
            references.len(),
            start_time.elapsed().as_secs_f32() * 1000.0
        );

        requests
            .par_iter()
            .zip(fingerprints.par_iter())
            .map(|(request, fingerprint)| {
                match references.get(&(request.song_id.as_str(), fingerprint)) {
                    Some(Ok(reference)) => self.score_against(reference, &request.performance),
                    Some(Err(e)) => Err(ScoringError::CacheBuild(e.clone())),
                    None => self.score(&request.song_id, &request.reference, &request.performance),
                }
            })
            .collect()
    }
}
