//! Real-time ingest pipeline: one call per render quantum.
//!
//! ```text
//! AudioQuantum (ch 0, f32 @ input rate)
//!     └─► resample_into()            → i16 @ analysis rate (scratch)
//!         └─► FrameAccumulator.push  → drop on full
//!             └─► while a full frame is buffered:
//!                     VoiceActivityDetector.classify()
//!                         └─► DecisionNotifier.post()
//! AudioQuantum ──(same shape)──► AudioQuantumMut     (pass-through)
//! ```
//!
//! Every buffer is sized in `new`. `process` performs no allocation, takes no
//! lock, does no I/O and never logs; counters are relaxed atomics.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::{
    audio::{meter::LevelMeter, resample, AudioQuantum, AudioQuantumMut},
    buffering::{frame::AnalysisRate, FrameAccumulator},
    engine::EngineConfig,
    ipc::{events::WorkletEvent, notifier::DecisionNotifier},
    vad::{Decision, VoiceActivityDetector},
};

/// Lightweight counters for pipeline observability.
#[derive(Debug)]
pub struct PipelineDiagnostics {
    pub quanta_in: AtomicUsize,
    pub samples_resampled: AtomicUsize,
    /// Analysis samples refused by a full ring.
    pub samples_dropped: AtomicUsize,
    pub frames_classified: AtomicUsize,
    pub voice_frames: AtomicUsize,
    pub frame_errors: AtomicUsize,
    pub decisions_posted: AtomicUsize,
    pub decisions_dropped: AtomicUsize,
    pub level_reports: AtomicUsize,
    /// Level reports refused by a full channel. Levels share the channel
    /// with decisions.
    pub levels_dropped: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            quanta_in: AtomicUsize::new(0),
            samples_resampled: AtomicUsize::new(0),
            samples_dropped: AtomicUsize::new(0),
            frames_classified: AtomicUsize::new(0),
            voice_frames: AtomicUsize::new(0),
            frame_errors: AtomicUsize::new(0),
            decisions_posted: AtomicUsize::new(0),
            decisions_dropped: AtomicUsize::new(0),
            level_reports: AtomicUsize::new(0),
            levels_dropped: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            quanta_in: self.quanta_in.load(Ordering::Relaxed),
            samples_resampled: self.samples_resampled.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            frames_classified: self.frames_classified.load(Ordering::Relaxed),
            voice_frames: self.voice_frames.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            decisions_posted: self.decisions_posted.load(Ordering::Relaxed),
            decisions_dropped: self.decisions_dropped.load(Ordering::Relaxed),
            level_reports: self.level_reports.load(Ordering::Relaxed),
            levels_dropped: self.levels_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub quanta_in: usize,
    pub samples_resampled: usize,
    pub samples_dropped: usize,
    pub frames_classified: usize,
    pub voice_frames: usize,
    pub frame_errors: usize,
    pub decisions_posted: usize,
    pub decisions_dropped: usize,
    pub level_reports: usize,
    pub levels_dropped: usize,
}

/// Per-quantum processing state owned by the real-time side.
pub struct RealtimeIngestPipeline {
    input_rate: u32,
    analysis_rate: AnalysisRate,
    /// Resampler output for one quantum.
    scratch: Box<[i16]>,
    accumulator: FrameAccumulator,
    detector: VoiceActivityDetector,
    notifier: DecisionNotifier,
    meter: Option<LevelMeter>,
    passthrough: bool,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl RealtimeIngestPipeline {
    /// Allocate every buffer for `config`. The detector starts idle.
    pub fn new(
        config: &EngineConfig,
        tx: Sender<WorkletEvent>,
        diagnostics: Arc<PipelineDiagnostics>,
    ) -> Self {
        let scratch_len = resample::max_output_len(
            config.render_quantum_frames,
            config.input_sample_rate,
            config.analysis_rate.hz(),
        );
        Self {
            input_rate: config.input_sample_rate,
            analysis_rate: config.analysis_rate,
            scratch: vec![0i16; scratch_len.max(1)].into_boxed_slice(),
            accumulator: FrameAccumulator::new(config.ring_capacity, config.frame_length()),
            detector: VoiceActivityDetector::idle(config.analysis_rate),
            notifier: DecisionNotifier::new(tx, Arc::clone(&diagnostics)),
            meter: config.level_report_interval.map(LevelMeter::new),
            passthrough: config.passthrough,
            diagnostics,
        }
    }

    /// Replace the (idle) detector with a live one.
    pub fn install_detector(&mut self, detector: VoiceActivityDetector) {
        self.detector = detector;
    }

    pub fn detector(&self) -> &VoiceActivityDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut VoiceActivityDetector {
        &mut self.detector
    }

    /// Analysis samples waiting for a full frame.
    pub fn buffered(&self) -> usize {
        self.accumulator.len()
    }

    /// Reset the classifier's adaptive state and drop any partial frame.
    ///
    /// # Errors
    /// `VadletError::ClassifierNotLive` once the classifier is released.
    pub fn reset_classifier(&mut self) -> crate::error::Result<()> {
        self.detector.reset()?;
        self.accumulator.clear();
        Ok(())
    }

    /// Release the classifier and clear buffered samples.
    ///
    /// Returns `true` if a classifier was released.
    pub fn release(&mut self) -> bool {
        let released = self.detector.destroy();
        self.accumulator.clear();
        released
    }

    /// Process one render quantum. Always returns `true` (keep processing).
    ///
    /// A missing input, an input with zero channels, or a released classifier
    /// skip analysis; pass-through still applies.
    pub fn process(
        &mut self,
        input: Option<&AudioQuantum<'_>>,
        output: Option<&mut AudioQuantumMut<'_>>,
    ) -> bool {
        self.diagnostics.quanta_in.fetch_add(1, Ordering::Relaxed);

        if let Some(input) = input {
            if let Some(magnitude) = self.meter.as_mut().and_then(|m| m.observe(input)) {
                self.notifier.post_level(magnitude);
            }
            if input.channels() > 0 && self.detector.is_live() {
                self.ingest(input.channel(0));
            }
        }

        if self.passthrough {
            pass_through(input, output);
        }
        true
    }

    fn ingest(&mut self, channel: &[f32]) {
        let produced = resample::resample_into(
            channel,
            self.input_rate,
            self.analysis_rate.hz(),
            &mut self.scratch,
        );
        self.diagnostics
            .samples_resampled
            .fetch_add(produced, Ordering::Relaxed);

        let accepted = self.accumulator.push(&self.scratch[..produced]);
        if accepted < produced {
            self.diagnostics
                .samples_dropped
                .fetch_add(produced - accepted, Ordering::Relaxed);
        }

        while let Some(frame) = self.accumulator.try_take_frame() {
            let Ok(decision) = self.detector.classify(&frame) else {
                break;
            };
            self.diagnostics
                .frames_classified
                .fetch_add(1, Ordering::Relaxed);
            match decision {
                Decision::Voice => {
                    self.diagnostics.voice_frames.fetch_add(1, Ordering::Relaxed);
                }
                Decision::Error => {
                    self.diagnostics.frame_errors.fetch_add(1, Ordering::Relaxed);
                }
                Decision::NoVoice => {}
            }
            self.notifier.post(decision);
        }
    }
}

/// Copy input to output when both exist and their shapes match.
pub fn pass_through(input: Option<&AudioQuantum<'_>>, output: Option<&mut AudioQuantumMut<'_>>) {
    if let (Some(input), Some(output)) = (input, output) {
        output.copy_from(input);
    }
}
