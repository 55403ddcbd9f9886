//! Pitch contour types
//!
//! A contour is the frame-by-frame pitch track of one signal. Voicing is an
//! explicit tag rather than a magic frequency, so unvoiced frames can never
//! leak into pitch arithmetic.

use serde::{Deserialize, Serialize};

/// Pitch estimate of one analysis frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Voicing {
    /// A fundamental was detected
    Voiced {
        /// Fundamental frequency in Hz
        frequency_hz: f32,
    },
    /// Silence, breath or noise
    Unvoiced,
}

/// One analysis time-step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchFrame {
    /// Frame start time in seconds
    pub time_sec: f64,
    /// Pitch estimate
    pub voicing: Voicing,
    /// Probability of the chosen estimate (0.0-1.0)
    pub confidence: f32,
}

impl PitchFrame {
    /// True if a fundamental was detected
    pub fn is_voiced(&self) -> bool {
        matches!(self.voicing, Voicing::Voiced { .. })
    }

    /// Fundamental frequency, if voiced
    pub fn frequency_hz(&self) -> Option<f32> {
        match self.voicing {
            Voicing::Voiced { frequency_hz } => Some(frequency_hz),
            Voicing::Unvoiced => None,
        }
    }
}

/// Frame-by-frame pitch track at a fixed hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchContour {
    /// Seconds between consecutive frames
    pub hop_sec: f64,
    /// Frames in time order
    pub frames: Vec<PitchFrame>,
}

impl PitchContour {
    /// Build a contour from per-frame voicing, timestamps derived from the hop
    ///
    /// Handy for callers that already hold a pitch track (and for tests).
    pub fn from_voicing(hop_sec: f64, voicing: impl IntoIterator<Item = Voicing>) -> Self {
        let frames = voicing
            .into_iter()
            .enumerate()
            .map(|(i, voicing)| PitchFrame {
                time_sec: i as f64 * hop_sec,
                voicing,
                confidence: match voicing {
                    Voicing::Voiced { .. } => 1.0,
                    Voicing::Unvoiced => 0.0,
                },
            })
            .collect();
        Self { hop_sec, frames }
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the contour holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of voiced frames
    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_voiced()).count()
    }
}

/// Pitch of a normalized frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalizedPitch {
    /// Voiced frame folded into one octave
    Voiced {
        /// Original fundamental in Hz
        frequency_hz: f32,
        /// MIDI note number modulo 12, in [0, 12)
        pitch_class: f32,
    },
    /// No pitch class
    Unvoiced,
}

/// One frame of a normalized contour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFrame {
    /// Frame start time in seconds
    pub time_sec: f64,
    /// Octave-folded pitch
    pub pitch: NormalizedPitch,
    /// Confidence carried over from extraction
    pub confidence: f32,
}

impl NormalizedFrame {
    /// True if the frame carries a pitch class
    pub fn is_voiced(&self) -> bool {
        matches!(self.pitch, NormalizedPitch::Voiced { .. })
    }

    /// Pitch class in [0, 12), if voiced
    pub fn pitch_class(&self) -> Option<f32> {
        match self.pitch {
            NormalizedPitch::Voiced { pitch_class, .. } => Some(pitch_class),
            NormalizedPitch::Unvoiced => None,
        }
    }
}

/// Octave-invariant pitch track, frame-aligned with its source contour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedContour {
    /// Seconds between consecutive frames
    pub hop_sec: f64,
    /// Frames in time order
    pub frames: Vec<NormalizedFrame>,
}

impl NormalizedContour {
    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if the contour holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of voiced frames
    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|f| f.is_voiced()).count()
    }

    /// Pitch class per frame (`None` where unvoiced)
    pub fn pitch_classes(&self) -> Vec<Option<f32>> {
        self.frames.iter().map(|f| f.pitch_class()).collect()
    }
}
