//! # vadlet-core
//!
//! Real-time voice activity pipeline for audio-worklet style hosts.
//!
//! ## Architecture
//!
//! ```text
//! host quantum → RealtimeIngestPipeline::process
//!                    │
//!          resample_into (→ 16 kHz i16)
//!                    │
//!          FrameAccumulator (SPSC ring)
//!                    │   one AnalysisFrame per 10 ms
//!          VoiceActivityDetector::classify
//!                    │
//!          DecisionNotifier ──crossbeam──► control-side EventReceiver
//! ```
//!
//! `WorkletLifecycle` gates the pipeline: until the host has completed every
//! bootstrap stage, quanta are passed through untouched.
//!
//! The process path is zero-alloc and lock-free. All heap work happens on the
//! control side, before the engine becomes `Ready`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{AudioQuantum, AudioQuantumMut, RENDER_QUANTUM_FRAMES};
pub use buffering::frame::{AnalysisRate, FrameDuration};
pub use engine::lifecycle::{LifecycleState, Stage, WorkletLifecycle};
pub use engine::{
    AudioContextControl, ContextHandle, EngineConfig, EngineStatus, HostSignal, NodeHandle,
    VadletEngine,
};
pub use error::VadletError;
pub use ipc::events::{LevelEvent, LifecycleStatusEvent, VadDecisionEvent, WorkletEvent};
pub use ipc::notifier::EventReceiver;
pub use vad::{ClassifierBackend, Decision, Sensitivity, VoiceActivityDetector, VoiceClassifier};

#[cfg(feature = "earshot")]
pub use vad::EarshotClassifier;
