//! Earshot-powered classifier adapter implementing `VoiceClassifier`.
//!
//! Earshot is a pure-Rust port of the WebRTC GMM voice activity detector. It
//! accepts 10/20/30 ms frames of 16-bit PCM at 8, 16 or 32 kHz.

use ::earshot::{VoiceActivityDetector, VoiceActivityProfile};

use super::{Decision, Sensitivity, VoiceClassifier};
use crate::buffering::frame::{AnalysisFrame, AnalysisRate};
use crate::error::Result;

/// Voice classifier backed by one earshot detector, rebuilt whenever the
/// sensitivity profile changes.
pub struct EarshotClassifier {
    detector: VoiceActivityDetector,
}

impl EarshotClassifier {
    /// Default-initialised at sensitivity level 2.
    pub fn new() -> Self {
        Self {
            detector: VoiceActivityDetector::new(profile_for(Sensitivity::default())),
        }
    }
}

impl Default for EarshotClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn profile_for(sensitivity: Sensitivity) -> VoiceActivityProfile {
    match sensitivity.level() {
        0 => VoiceActivityProfile::QUALITY,
        1 => VoiceActivityProfile::LBR,
        2 => VoiceActivityProfile::AGGRESSIVE,
        _ => VoiceActivityProfile::VERY_AGGRESSIVE,
    }
}

impl VoiceClassifier for EarshotClassifier {
    /// Earshot fixes its profile at construction, so a new level rebuilds the
    /// detector (which also resets its noise estimate).
    fn set_sensitivity(&mut self, sensitivity: Sensitivity) -> Result<()> {
        self.detector = VoiceActivityDetector::new(profile_for(sensitivity));
        Ok(())
    }

    fn predict(&mut self, frame: &AnalysisFrame<'_>, rate: AnalysisRate) -> Decision {
        let samples = frame.samples();
        let result = match rate {
            AnalysisRate::Khz8 => self.detector.predict_8khz(samples),
            AnalysisRate::Khz16 => self.detector.predict_16khz(samples),
            AnalysisRate::Khz32 => self.detector.predict_32khz(samples),
        };
        match result {
            Ok(true) => Decision::Voice,
            Ok(false) => Decision::NoVoice,
            Err(_) => Decision::Error,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot"
    }
}
