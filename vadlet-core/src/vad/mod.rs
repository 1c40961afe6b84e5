//! Voice Activity Detection (VAD) abstraction.
//!
//! The `VoiceClassifier` trait is the seam to the external classifier: swap
//! in `EarshotClassifier` (default), `EnergyClassifier`, or a scripted double
//! without touching the pipeline.
//!
//! `VoiceActivityDetector` owns the one live classifier. Liveness is an
//! `Option<ClassifierHandle>`, so use-before-create and use-after-destroy are
//! refused with `ClassifierNotLive` instead of reaching the backend.

#[cfg(feature = "earshot")]
pub mod earshot;
pub mod energy;

#[cfg(feature = "earshot")]
pub use self::earshot::EarshotClassifier;
pub use self::energy::EnergyClassifier;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::buffering::frame::{AnalysisFrame, AnalysisRate};
use crate::error::{Result, VadletError};

/// Outcome of classifying one analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Voice,
    NoVoice,
    /// The classifier produced no usable result for this frame.
    Error,
}

impl Decision {
    /// Map a raw classifier return code: negative → `Error`, 0 → `NoVoice`,
    /// positive → `Voice`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            c if c < 0 => Decision::Error,
            0 => Decision::NoVoice,
            _ => Decision::Voice,
        }
    }

    /// Wire encoding: `Some(1)` voice, `Some(0)` no voice, `None` for errors.
    pub fn code(self) -> Option<u8> {
        match self {
            Decision::Voice => Some(1),
            Decision::NoVoice => Some(0),
            Decision::Error => None,
        }
    }

    pub fn is_voice(self) -> bool {
        self == Decision::Voice
    }
}

/// Classifier aggressiveness, 0 (least aggressive) to 3 (most aggressive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Sensitivity(u8);

impl Sensitivity {
    pub const MAX: u8 = 3;

    pub fn new(level: u8) -> Result<Self> {
        if level > Self::MAX {
            return Err(VadletError::InvalidSensitivity(level));
        }
        Ok(Self(level))
    }

    pub fn level(self) -> u8 {
        self.0
    }
}

impl Default for Sensitivity {
    /// Level 2 ("aggressive").
    fn default() -> Self {
        Self(2)
    }
}

impl TryFrom<u8> for Sensitivity {
    type Error = VadletError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<Sensitivity> for u8 {
    fn from(s: Sensitivity) -> u8 {
        s.0
    }
}

/// Contract for external voice activity classifiers.
///
/// Implementors may be stateful (noise estimates, hangover counters, etc.).
/// `predict` runs on the real-time thread and must be bounded and
/// allocation-free.
pub trait VoiceClassifier: Send + 'static {
    /// Apply an aggressiveness level.
    ///
    /// # Errors
    /// Returns `VadletError::Config` if the backend rejects the change.
    fn set_sensitivity(&mut self, sensitivity: Sensitivity) -> Result<()>;

    /// Classify exactly one frame sampled at `rate`.
    fn predict(&mut self, frame: &AnalysisFrame<'_>, rate: AnalysisRate) -> Decision;

    /// Reset adaptive state.
    fn reset(&mut self);

    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Owned, non-null reference to a constructed classifier.
pub struct ClassifierHandle(Box<dyn VoiceClassifier>);

impl ClassifierHandle {
    pub fn new<C: VoiceClassifier>(classifier: C) -> Self {
        Self(Box::new(classifier))
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClassifierHandle").field(&self.0.name()).finish()
    }
}

/// Builds a fresh classifier on demand.
pub type ClassifierFactory = Box<dyn FnMut() -> Result<ClassifierHandle> + Send>;

/// Built-in classifier backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// WebRTC-derived GMM classifier (requires the `earshot` feature).
    #[default]
    Earshot,
    /// RMS threshold with hangover.
    Energy,
}

impl ClassifierBackend {
    /// Construct a default-initialised classifier for this backend.
    pub fn build(self) -> Result<ClassifierHandle> {
        match self {
            #[cfg(feature = "earshot")]
            ClassifierBackend::Earshot => Ok(ClassifierHandle::new(EarshotClassifier::new())),
            #[cfg(not(feature = "earshot"))]
            ClassifierBackend::Earshot => {
                tracing::warn!("compiled without the earshot feature, falling back to energy classifier");
                Ok(ClassifierHandle::new(EnergyClassifier::default()))
            }
            ClassifierBackend::Energy => Ok(ClassifierHandle::new(EnergyClassifier::default())),
        }
    }

    /// Factory closure suitable for `VadletEngine::with_classifier_factory`.
    pub fn factory(self) -> ClassifierFactory {
        Box::new(move || self.build())
    }
}

/// Owns the single live classifier.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    handle: Option<ClassifierHandle>,
    rate: AnalysisRate,
    sensitivity: Sensitivity,
}

impl VoiceActivityDetector {
    /// A detector with no classifier. Every call is refused until one is created.
    pub fn idle(rate: AnalysisRate) -> Self {
        Self {
            handle: None,
            rate,
            sensitivity: Sensitivity::default(),
        }
    }

    /// Construct a live detector from `factory`.
    ///
    /// # Errors
    /// Returns `VadletError::Init` if the classifier cannot be built.
    pub fn create<F>(factory: F, rate: AnalysisRate) -> Result<Self>
    where
        F: FnOnce() -> Result<ClassifierHandle>,
    {
        let handle = factory().map_err(|e| match e {
            VadletError::Init(_) => e,
            other => VadletError::Init(other.to_string()),
        })?;
        info!(classifier = handle.0.name(), rate = rate.hz(), "classifier created");
        Ok(Self {
            handle: Some(handle),
            rate,
            sensitivity: Sensitivity::default(),
        })
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_some()
    }

    pub fn rate(&self) -> AnalysisRate {
        self.rate
    }

    /// Last successfully applied sensitivity.
    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    /// Validate and forward a sensitivity level.
    ///
    /// Out-of-range levels and a missing classifier are rejected without
    /// touching the backend; a backend failure leaves the previous level in
    /// force.
    pub fn set_sensitivity(&mut self, level: u8) -> Result<()> {
        let sensitivity = Sensitivity::new(level)?;
        let handle = self.handle.as_mut().ok_or(VadletError::ClassifierNotLive)?;
        handle.0.set_sensitivity(sensitivity).map_err(|e| match e {
            VadletError::Config(_) => e,
            other => VadletError::Config(other.to_string()),
        })?;
        self.sensitivity = sensitivity;
        debug!(level, "sensitivity applied");
        Ok(())
    }

    /// Classify one frame at the detector's analysis rate.
    ///
    /// # Errors
    /// Returns `VadletError::ClassifierNotLive` once the classifier is gone.
    pub fn classify(&mut self, frame: &AnalysisFrame<'_>) -> Result<Decision> {
        let handle = self.handle.as_mut().ok_or(VadletError::ClassifierNotLive)?;
        Ok(handle.0.predict(frame, self.rate))
    }

    /// Clear the classifier's adaptive state, keeping its sensitivity.
    ///
    /// # Errors
    /// Returns `VadletError::ClassifierNotLive` once the classifier is gone.
    pub fn reset(&mut self) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(VadletError::ClassifierNotLive)?;
        handle.0.reset();
        Ok(())
    }

    /// Release the classifier. Calling this again is a no-op.
    ///
    /// Returns `true` when a classifier was actually released.
    pub fn destroy(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                info!(classifier = handle.0.name(), "classifier destroyed");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClassifier {
        predictions: Arc<AtomicUsize>,
        reject_config: bool,
    }

    impl VoiceClassifier for CountingClassifier {
        fn set_sensitivity(&mut self, _sensitivity: Sensitivity) -> Result<()> {
            if self.reject_config {
                return Err(VadletError::Config("backend refused".into()));
            }
            Ok(())
        }

        fn predict(&mut self, _frame: &AnalysisFrame<'_>, _rate: AnalysisRate) -> Decision {
            self.predictions.fetch_add(1, Ordering::Relaxed);
            Decision::Voice
        }

        fn reset(&mut self) {}
    }

    fn counting(reject_config: bool) -> (VoiceActivityDetector, Arc<AtomicUsize>) {
        let predictions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&predictions);
        let vad = VoiceActivityDetector::create(
            move || {
                Ok(ClassifierHandle::new(CountingClassifier {
                    predictions: counter,
                    reject_config,
                }))
            },
            AnalysisRate::Khz16,
        )
        .expect("create detector");
        (vad, predictions)
    }

    #[test]
    fn raw_codes_map_to_decisions() {
        assert_eq!(Decision::from_raw(1), Decision::Voice);
        assert_eq!(Decision::from_raw(0), Decision::NoVoice);
        assert_eq!(Decision::from_raw(-1), Decision::Error);
        assert_eq!(Decision::Error.code(), None);
        assert_eq!(Decision::Voice.code(), Some(1));
    }

    #[test]
    fn sensitivity_range_is_enforced() {
        assert!(Sensitivity::new(3).is_ok());
        assert!(matches!(
            Sensitivity::new(4),
            Err(VadletError::InvalidSensitivity(4))
        ));
        assert_eq!(Sensitivity::default().level(), 2);
    }

    #[test]
    fn invalid_level_leaves_previous_setting() {
        let (mut vad, _) = counting(false);
        vad.set_sensitivity(1).expect("level 1");
        assert!(matches!(
            vad.set_sensitivity(4),
            Err(VadletError::InvalidSensitivity(4))
        ));
        assert_eq!(vad.sensitivity().level(), 1);
        vad.set_sensitivity(2).expect("level 2 after rejection");
        assert_eq!(vad.sensitivity().level(), 2);
    }

    #[test]
    fn backend_config_failure_is_reported() {
        let (mut vad, _) = counting(true);
        assert!(matches!(vad.set_sensitivity(0), Err(VadletError::Config(_))));
        assert_eq!(vad.sensitivity(), Sensitivity::default());
    }

    #[test]
    fn factory_failure_becomes_init_error() {
        let err = VoiceActivityDetector::create(
            || Err(VadletError::Other(anyhow::anyhow!("no memory"))),
            AnalysisRate::Khz16,
        )
        .expect_err("factory failure");
        assert!(matches!(err, VadletError::Init(_)));
        assert!(err.is_terminal());
    }

    #[test]
    fn destroyed_detector_refuses_work() {
        let (mut vad, predictions) = counting(false);
        let samples = [0i16; 160];
        let frame = AnalysisFrame::new(&samples);
        assert_eq!(vad.classify(&frame).expect("live"), Decision::Voice);

        assert!(vad.destroy());
        assert!(!vad.destroy(), "second destroy is a no-op");
        assert!(!vad.is_live());
        assert!(matches!(
            vad.classify(&frame),
            Err(VadletError::ClassifierNotLive)
        ));
        assert!(matches!(
            vad.set_sensitivity(1),
            Err(VadletError::ClassifierNotLive)
        ));
        assert_eq!(predictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn idle_detector_is_not_live() {
        let mut vad = VoiceActivityDetector::idle(AnalysisRate::Khz8);
        assert!(!vad.is_live());
        assert!(!vad.destroy());
        assert!(matches!(vad.reset(), Err(VadletError::ClassifierNotLive)));
    }

    #[test]
    fn energy_backend_builds() {
        let handle = ClassifierBackend::Energy.build().expect("energy backend");
        assert_eq!(handle.0.name(), "energy");
    }
}
