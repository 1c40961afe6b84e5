use thiserror::Error;

use crate::engine::lifecycle::Stage;

/// All errors produced by vadlet-core.
#[derive(Debug, Error)]
pub enum VadletError {
    /// The classifier could not be constructed or initialised.
    #[error("classifier init failed: {0}")]
    Init(String),

    #[error("sensitivity level {0} is out of range (expected 0..=3)")]
    InvalidSensitivity(u8),

    /// The classifier was never created or has already been destroyed.
    #[error("classifier is not live")]
    ClassifierNotLive,

    /// The classifier rejected a configuration change.
    #[error("classifier configuration failed: {0}")]
    Config(String),

    #[error("lifecycle stage {stage} failed: {detail}")]
    Lifecycle { stage: Stage, detail: String },

    #[error("invalid engine state: {0}")]
    InvalidState(String),

    #[error("invalid engine config: {0}")]
    InvalidConfig(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VadletError {
    /// `true` for errors that end the pipeline for the rest of the process.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VadletError::Init(_) | VadletError::Lifecycle { .. })
    }

    /// `true` for a rejected configuration change: a bad level, no live
    /// classifier to configure, or a backend refusal.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            VadletError::InvalidSensitivity(_)
                | VadletError::ClassifierNotLive
                | VadletError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VadletError>;
