//! `VadletEngine`: the single owned controller.
//!
//! ## Lifecycle
//!
//! ```text
//! VadletEngine::new()
//!     └─► warm_up()                   → classifier created, default sensitivity applied
//!         └─► on_signal() × 4         → ContextCreated … NodeCreated
//!             └─► (ready flag)        → Ready, process() starts analysing
//!                 └─► cleanup()       → classifier released, pass-through only
//! ```
//!
//! `run_lifecycle()` drives the same sequence from a tokio channel of
//! `HostSignal`s, awaiting each completion in turn.
//!
//! ## Threading
//!
//! The engine is exclusively owned. Control operations and `process` all take
//! `&mut self`, so they are serialised by ownership: whoever holds the engine
//! is the one intermediary between the two sides. A host that runs `process`
//! on an audio thread moves the engine there once it is `Ready`; status stays
//! observable through `status_handle()` and `subscribe_status()`.

pub mod lifecycle;
pub mod pipeline;

use std::num::NonZeroU32;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{AudioQuantum, AudioQuantumMut, RENDER_QUANTUM_FRAMES},
    buffering::{
        frame::{AnalysisRate, FrameDuration},
        DEFAULT_RING_CAPACITY,
    },
    error::{Result, VadletError},
    ipc::{
        events::LifecycleStatusEvent,
        notifier::{event_channel, EventReceiver, DEFAULT_EVENT_CAPACITY},
    },
    vad::{ClassifierBackend, ClassifierFactory, Sensitivity, VoiceActivityDetector},
};

use self::lifecycle::{LifecycleState, Stage, WorkletLifecycle};
use self::pipeline::{DiagnosticsSnapshot, PipelineDiagnostics, RealtimeIngestPipeline};

/// Broadcast channel capacity for lifecycle status events.
const STATUS_BROADCAST_CAP: usize = 64;

/// Name the processor is registered under.
pub const PROCESSOR_NAME: &str = "vadlet-processor";

/// Configuration for `VadletEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate of the host's audio context (Hz). Default: 48000.
    pub input_sample_rate: u32,
    /// Rate the classifier analyses at. Default: 16 kHz.
    pub analysis_rate: AnalysisRate,
    /// Analysis frame duration. Default: 10 ms (160 samples at 16 kHz).
    pub frame_duration: FrameDuration,
    /// Largest quantum the host delivers, in frames. Default: 128.
    pub render_quantum_frames: usize,
    /// Accumulator capacity in analysis samples. Default: 1024.
    pub ring_capacity: usize,
    /// Level applied right after the classifier is created. Default: 2.
    pub sensitivity: Sensitivity,
    /// Copy input to output when shapes match. Default: true.
    pub passthrough: bool,
    /// Decision channel capacity. Default: 256.
    pub event_capacity: usize,
    /// Post an input level every N quanta. `None` disables metering.
    pub level_report_interval: Option<u32>,
    pub backend: ClassifierBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 48_000,
            analysis_rate: AnalysisRate::default(),
            frame_duration: FrameDuration::default(),
            render_quantum_frames: RENDER_QUANTUM_FRAMES,
            ring_capacity: DEFAULT_RING_CAPACITY,
            sensitivity: Sensitivity::default(),
            passthrough: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            level_report_interval: None,
            backend: ClassifierBackend::default(),
        }
    }
}

impl EngineConfig {
    /// Samples per analysis frame.
    pub fn frame_length(&self) -> usize {
        self.frame_duration.samples_at(self.analysis_rate)
    }

    /// Analysis samples one full quantum resamples to.
    pub fn samples_per_quantum(&self) -> usize {
        crate::audio::resample::max_output_len(
            self.render_quantum_frames,
            self.input_sample_rate,
            self.analysis_rate.hz(),
        )
    }

    /// # Errors
    /// `VadletError::InvalidConfig` when the buffers could never produce a frame.
    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 {
            return Err(VadletError::InvalidConfig(
                "input sample rate must be positive".into(),
            ));
        }
        if self.render_quantum_frames == 0 {
            return Err(VadletError::InvalidConfig(
                "render quantum must hold at least one frame".into(),
            ));
        }
        if self.ring_capacity < self.frame_length() {
            return Err(VadletError::InvalidConfig(format!(
                "ring capacity {} is smaller than one {} ms frame ({} samples)",
                self.ring_capacity,
                self.frame_duration.millis(),
                self.frame_length()
            )));
        }
        if self.level_report_interval == Some(0) {
            return Err(VadletError::InvalidConfig(
                "level report interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Host handle of a created audio context. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(NonZeroU32);

impl ContextHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Host handle of the created processing node. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(NonZeroU32);

impl NodeHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Asynchronous completion delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    ContextCreated(std::result::Result<ContextHandle, String>),
    ThreadStarted(std::result::Result<(), String>),
    ProcessorRegistered(std::result::Result<(), String>),
    NodeCreated(std::result::Result<NodeHandle, String>),
}

impl HostSignal {
    pub fn stage(&self) -> Stage {
        match self {
            HostSignal::ContextCreated(_) => Stage::ContextCreation,
            HostSignal::ThreadStarted(_) => Stage::ThreadStart,
            HostSignal::ProcessorRegistered(_) => Stage::ProcessorRegistration,
            HostSignal::NodeCreated(_) => Stage::NodeCreation,
        }
    }
}

/// Host operations on an audio context.
pub trait AudioContextControl {
    fn is_running(&self, ctx: ContextHandle) -> bool;

    /// # Errors
    /// Whatever the host reports when the context cannot be resumed.
    fn resume(&mut self, ctx: ContextHandle) -> Result<()>;
}

/// Shape of the processing node the host should create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOptions {
    pub processor_name: &'static str,
    pub number_of_inputs: u32,
    pub number_of_outputs: u32,
    pub output_channel_count: Vec<u32>,
}

/// Point-in-time view of the engine for the control side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: LifecycleState,
    pub sensitivity: u8,
    pub classifier_live: bool,
    /// 0 while no context exists.
    pub context_handle: u32,
}

/// Cloneable read-only view of the lifecycle state, for other threads.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<Mutex<LifecycleState>>);

impl StatusHandle {
    pub fn get(&self) -> LifecycleState {
        *self.0.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.get() == LifecycleState::Ready
    }
}

pub struct VadletEngine {
    config: EngineConfig,
    lifecycle: WorkletLifecycle,
    pipeline: RealtimeIngestPipeline,
    factory: ClassifierFactory,
    context: Option<ContextHandle>,
    node: Option<NodeHandle>,
    /// Set once `cleanup` has released a classifier; no re-creation afterwards.
    released: bool,
    /// Canonical state for other threads (written only on control transitions).
    status: Arc<Mutex<LifecycleState>>,
    status_tx: broadcast::Sender<LifecycleStatusEvent>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl VadletEngine {
    /// Create an engine using the configured classifier backend.
    ///
    /// Returns the engine and the control-side half of the decision channel.
    pub fn new(config: EngineConfig) -> Result<(Self, EventReceiver)> {
        let factory = config.backend.factory();
        Self::with_classifier_factory(config, factory)
    }

    /// Create an engine that builds its classifier with `factory`.
    ///
    /// # Errors
    /// `VadletError::InvalidConfig` if `config` fails validation.
    pub fn with_classifier_factory(
        config: EngineConfig,
        factory: ClassifierFactory,
    ) -> Result<(Self, EventReceiver)> {
        config.validate()?;
        if config.ring_capacity < config.frame_length() + config.samples_per_quantum() {
            warn!(
                ring_capacity = config.ring_capacity,
                frame_length = config.frame_length(),
                per_quantum = config.samples_per_quantum(),
                "ring capacity leaves no headroom; samples may be dropped"
            );
        }

        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let (tx, rx) = event_channel(config.event_capacity);
        let pipeline = RealtimeIngestPipeline::new(&config, tx, Arc::clone(&diagnostics));
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_CAP);

        info!(
            input_rate = config.input_sample_rate,
            analysis_rate = config.analysis_rate.hz(),
            frame_ms = config.frame_duration.millis(),
            ring_capacity = config.ring_capacity,
            backend = ?config.backend,
            "engine configured"
        );

        let engine = Self {
            config,
            lifecycle: WorkletLifecycle::new(),
            pipeline,
            factory,
            context: None,
            node: None,
            released: false,
            status: Arc::new(Mutex::new(LifecycleState::Unstarted)),
            status_tx,
            diagnostics,
        };
        Ok((engine, rx))
    }

    /// Create the classifier and apply the configured default sensitivity.
    ///
    /// Calling this again while the classifier is live is a no-op.
    ///
    /// # Errors
    /// - `VadletError::Init` if the classifier cannot be built; the lifecycle
    ///   is then `Failed`.
    /// - `VadletError::InvalidState` after failure or cleanup.
    pub fn warm_up(&mut self) -> Result<()> {
        if self.lifecycle.is_failed() || self.released {
            return Err(VadletError::InvalidState(
                "classifier cannot be created after failure or cleanup".into(),
            ));
        }
        if self.pipeline.detector().is_live() {
            debug!("classifier already live");
            return Ok(());
        }

        let rate = self.config.analysis_rate;
        let factory = &mut self.factory;
        let mut detector = match VoiceActivityDetector::create(|| factory(), rate) {
            Ok(detector) => detector,
            Err(e) => {
                error!(error = %e, "classifier creation failed");
                self.lifecycle.abort();
                self.publish(Some(e.to_string()));
                return Err(e);
            }
        };

        let level = self.config.sensitivity.level();
        if let Err(e) = detector.set_sensitivity(level) {
            warn!(level, error = %e, "default sensitivity not applied");
        }
        self.pipeline.install_detector(detector);
        Ok(())
    }

    /// Apply one asynchronous completion from the host.
    ///
    /// After a successful `NodeCreated` the ready flag is raised immediately,
    /// provided the classifier is live.
    ///
    /// # Errors
    /// - `VadletError::Lifecycle` on a failed or out-of-order stage; the engine
    ///   is then `Failed` and its classifier released.
    /// - `VadletError::InvalidState` once `Ready` or `Failed` (no state change).
    pub fn on_signal(&mut self, signal: HostSignal) -> Result<LifecycleState> {
        let stage = signal.stage();
        let mut context = None;
        let mut node = None;
        let outcome = match signal {
            HostSignal::ContextCreated(r) => r.map(|ctx| context = Some(ctx)),
            HostSignal::ThreadStarted(r) | HostSignal::ProcessorRegistered(r) => r,
            HostSignal::NodeCreated(r) => r.map(|n| node = Some(n)),
        };

        let state = self.advance(stage, outcome)?;
        if let Some(ctx) = context {
            self.context = Some(ctx);
        }
        if let Some(n) = node {
            self.node = Some(n);
        }

        if state == LifecycleState::NodeCreated {
            let flag = if self.pipeline.detector().is_live() {
                Ok(())
            } else {
                Err("classifier is not live".to_string())
            };
            return self.advance(Stage::ReadyFlag, flag);
        }
        Ok(state)
    }

    /// Await host completions until the lifecycle is `Ready` or `Failed`.
    ///
    /// Creates the classifier first if `warm_up` has not been called.
    ///
    /// # Errors
    /// The first `Init` or `Lifecycle` error; a channel closed before `Ready`
    /// fails the pending stage.
    pub async fn run_lifecycle(&mut self, signals: &mut mpsc::Receiver<HostSignal>) -> Result<()> {
        if !self.pipeline.detector().is_live() {
            self.warm_up()?;
        }

        while let Some(expected) = self.lifecycle.next_stage() {
            match signals.recv().await {
                Some(signal) => {
                    self.on_signal(signal)?;
                }
                None => {
                    return Err(self.fail(expected, "host closed the signal channel".into()));
                }
            }
        }

        if self.lifecycle.is_ready() {
            Ok(())
        } else {
            Err(VadletError::InvalidState(
                "lifecycle already failed".into(),
            ))
        }
    }

    /// Real-time entry point. Returns `true` to keep the processor alive.
    ///
    /// Before `Ready` the quantum is only passed through.
    pub fn process(
        &mut self,
        input: Option<&AudioQuantum<'_>>,
        output: Option<&mut AudioQuantumMut<'_>>,
    ) -> bool {
        if !self.lifecycle.is_ready() {
            if self.config.passthrough {
                pipeline::pass_through(input, output);
            }
            return true;
        }
        self.pipeline.process(input, output)
    }

    /// Resume the audio context if it exists and is not running.
    ///
    /// # Errors
    /// Propagates the host's resume failure.
    pub fn resume<C: AudioContextControl>(&mut self, host: &mut C) -> Result<()> {
        let Some(ctx) = self.context else {
            debug!("resume requested before a context exists");
            return Ok(());
        };
        if host.is_running(ctx) {
            return Ok(());
        }
        host.resume(ctx)?;
        info!(context = ctx.get(), "audio context resumed");
        Ok(())
    }

    /// Change classifier aggressiveness (0..=3).
    ///
    /// # Errors
    /// - `VadletError::InvalidSensitivity` for levels above 3.
    /// - `VadletError::ClassifierNotLive` before `warm_up` or after `cleanup`.
    /// - `VadletError::Config` if the classifier refuses the level.
    pub fn set_sensitivity(&mut self, level: u8) -> Result<()> {
        match self.pipeline.detector_mut().set_sensitivity(level) {
            Ok(()) => {
                info!(level, "sensitivity changed");
                Ok(())
            }
            Err(e) => {
                warn!(level, error = %e, "sensitivity change rejected");
                Err(e)
            }
        }
    }

    /// Reset the classifier's adaptive state and drop buffered samples.
    ///
    /// Sensitivity is kept. Useful when the input source changes.
    ///
    /// # Errors
    /// `VadletError::ClassifierNotLive` before `warm_up` or after `cleanup`.
    pub fn reset_classifier(&mut self) -> Result<()> {
        self.pipeline.reset_classifier()?;
        info!("classifier reset");
        Ok(())
    }

    /// Release the classifier. Calling this again is a no-op.
    ///
    /// Audio keeps passing through; no further decisions are produced.
    pub fn cleanup(&mut self) {
        if !self.pipeline.release() {
            debug!("cleanup: no classifier to release");
            return;
        }
        self.released = true;
        let d = self.diagnostics.snapshot();
        info!(
            quanta = d.quanta_in,
            frames = d.frames_classified,
            voice_frames = d.voice_frames,
            frame_errors = d.frame_errors,
            decisions_posted = d.decisions_posted,
            decisions_dropped = d.decisions_dropped,
            samples_dropped = d.samples_dropped,
            levels_dropped = d.levels_dropped,
            "classifier released"
        );
    }

    /// Raw context handle, 0 while none exists.
    pub fn context_handle(&self) -> u32 {
        self.context.map_or(0, ContextHandle::get)
    }

    pub fn node_handle(&self) -> Option<NodeHandle> {
        self.node
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn status(&self) -> EngineStatus {
        let detector = self.pipeline.detector();
        EngineStatus {
            state: self.lifecycle.state(),
            sensitivity: detector.sensitivity().level(),
            classifier_live: detector.is_live(),
            context_handle: self.context_handle(),
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle(Arc::clone(&self.status))
    }

    /// Subscribe to lifecycle transitions.
    pub fn subscribe_status(&self) -> broadcast::Receiver<LifecycleStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One input, one output, one output channel.
    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            processor_name: PROCESSOR_NAME,
            number_of_inputs: 1,
            number_of_outputs: 1,
            output_channel_count: vec![1],
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn advance(
        &mut self,
        stage: Stage,
        outcome: std::result::Result<(), String>,
    ) -> Result<LifecycleState> {
        match self.lifecycle.advance(stage, outcome) {
            Ok(state) => {
                info!(%stage, %state, "lifecycle advanced");
                self.publish(None);
                Ok(state)
            }
            Err(e @ VadletError::Lifecycle { .. }) => {
                self.on_failure(&e);
                Err(e)
            }
            Err(e) => {
                warn!(%stage, error = %e, "lifecycle signal ignored");
                Err(e)
            }
        }
    }

    fn fail(&mut self, stage: Stage, detail: String) -> VadletError {
        let e = self.lifecycle.fail(stage, detail);
        self.on_failure(&e);
        e
    }

    fn on_failure(&mut self, e: &VadletError) {
        error!(error = %e, "lifecycle failed");
        self.pipeline.release();
        self.publish(Some(e.to_string()));
    }

    fn publish(&self, detail: Option<String>) {
        let state = self.lifecycle.state();
        *self.status.lock() = state;
        let _ = self.status_tx.send(LifecycleStatusEvent { state, detail });
    }
}
