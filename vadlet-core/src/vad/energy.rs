//! Energy-based classifier using an RMS threshold + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute the RMS of the frame, normalised to [0.0, 1.0].
//! 2. If RMS ≥ `threshold` → `Voice`, reload the hangover counter.
//! 3. If RMS < `threshold` and the counter > 0 → `Voice`, decrement
//!    (prevents clipping syllable endings).
//! 4. Otherwise → `NoVoice`.
//!
//! Higher sensitivity levels raise the threshold and shorten the hangover.

use super::{Decision, Sensitivity, VoiceClassifier};
use crate::buffering::frame::{AnalysisFrame, AnalysisRate};
use crate::error::Result;

/// (threshold, hangover frames) per sensitivity level 0..=3.
const LEVELS: [(f32, u32); 4] = [(0.005, 8), (0.01, 6), (0.02, 4), (0.04, 2)];

#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    /// RMS amplitude threshold. Frames above this are considered voice.
    threshold: f32,
    /// How many consecutive quiet frames still report `Voice` after real
    /// speech ends.
    hangover_frames: u32,
    /// Current hangover countdown.
    hangover_counter: u32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32, hangover_frames: u32) -> Self {
        Self {
            threshold,
            hangover_frames,
            hangover_counter: 0,
        }
    }

    /// Normalised root-mean-square of 16-bit samples.
    fn rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples
            .iter()
            .map(|s| {
                let v = *s as f64 / 32_768.0;
                v * v
            })
            .sum();
        (sum_sq / samples.len() as f64).sqrt() as f32
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        let (threshold, hangover) = LEVELS[Sensitivity::default().level() as usize];
        Self::new(threshold, hangover)
    }
}

impl VoiceClassifier for EnergyClassifier {
    fn set_sensitivity(&mut self, sensitivity: Sensitivity) -> Result<()> {
        let (threshold, hangover) = LEVELS[sensitivity.level() as usize];
        self.threshold = threshold;
        self.hangover_frames = hangover;
        self.hangover_counter = self.hangover_counter.min(hangover);
        Ok(())
    }

    fn predict(&mut self, frame: &AnalysisFrame<'_>, _rate: AnalysisRate) -> Decision {
        if frame.is_empty() {
            return Decision::Error;
        }
        let rms = Self::rms(frame.samples());

        if rms >= self.threshold {
            self.hangover_counter = self.hangover_frames;
            Decision::Voice
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            Decision::Voice
        } else {
            Decision::NoVoice
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(vad: &mut EnergyClassifier, samples: &[i16]) -> Decision {
        vad.predict(&AnalysisFrame::new(samples), AnalysisRate::Khz16)
    }

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyClassifier::new(0.02, 0);
        assert_eq!(classify(&mut vad, &[0; 160]), Decision::NoVoice);
    }

    #[test]
    fn loud_frame_is_voice() {
        let mut vad = EnergyClassifier::new(0.02, 0);
        assert_eq!(classify(&mut vad, &[16_000; 160]), Decision::Voice);
    }

    #[test]
    fn hangover_extends_voice() {
        let mut vad = EnergyClassifier::new(0.02, 2);
        assert_eq!(classify(&mut vad, &[16_000; 160]), Decision::Voice);
        assert_eq!(classify(&mut vad, &[0; 160]), Decision::Voice);
        assert_eq!(classify(&mut vad, &[0; 160]), Decision::Voice);
        assert_eq!(classify(&mut vad, &[0; 160]), Decision::NoVoice);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyClassifier::new(0.02, 5);
        classify(&mut vad, &[16_000; 160]);
        vad.reset();
        assert_eq!(classify(&mut vad, &[0; 160]), Decision::NoVoice);
    }

    #[test]
    fn higher_sensitivity_needs_more_energy() {
        // RMS ≈ 0.0153: voice at level 1, silence at level 3.
        let quiet = [500i16; 160];
        let mut vad = EnergyClassifier::default();
        vad.set_sensitivity(Sensitivity::new(1).expect("level"))
            .expect("apply level 1");
        assert_eq!(classify(&mut vad, &quiet), Decision::Voice);

        vad.reset();
        vad.set_sensitivity(Sensitivity::new(3).expect("level"))
            .expect("apply level 3");
        assert_eq!(classify(&mut vad, &quiet), Decision::NoVoice);
    }

    #[test]
    fn empty_frame_is_an_error() {
        let mut vad = EnergyClassifier::default();
        assert_eq!(classify(&mut vad, &[]), Decision::Error);
    }
}
