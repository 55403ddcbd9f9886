//! Frame energy and the voicing energy gate
//!
//! Pitch trackers happily report periodicity in breath noise and room tone.
//! Frames much quieter than the recording's average are forced unvoiced.

/// Energy gate configuration
#[derive(Debug, Clone)]
pub struct EnergyGate {
    /// Gate threshold as a fraction of the mean frame RMS (default: 0.02)
    pub ratio: f32,
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self { ratio: 0.02 }
    }
}

impl EnergyGate {
    /// Mark which frames carry enough energy to be voiced
    ///
    /// # Arguments
    ///
    /// * `frame_rms` - RMS energy per analysis frame
    ///
    /// # Returns
    ///
    /// One flag per frame, `true` where the frame passes the gate
    pub fn open_frames(&self, frame_rms: &[f32]) -> Vec<bool> {
        if frame_rms.is_empty() {
            return Vec::new();
        }

        let mean = frame_rms.iter().sum::<f32>() / frame_rms.len() as f32;
        let threshold = mean * self.ratio;

        log::debug!(
            "Energy gate: mean RMS {:.5}, threshold {:.5} over {} frames",
            mean,
            threshold,
            frame_rms.len()
        );

        frame_rms.iter().map(|&rms| rms > threshold).collect()
    }
}

/// RMS of one frame
pub fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let energy: f32 = frame.iter().map(|&s| s * s).sum();
    (energy / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rms() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert!((frame_rms(&[1.0, -1.0, 1.0, -1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gate_closes_quiet_frames() {
        let gate = EnergyGate::default();
        let rms = vec![0.5, 0.5, 0.001, 0.5];
        assert_eq!(gate.open_frames(&rms), vec![true, true, false, true]);
    }

    #[test]
    fn test_gate_all_zero_closes_everything() {
        let gate = EnergyGate::default();
        assert_eq!(gate.open_frames(&[0.0, 0.0]), vec![false, false]);
    }
}
