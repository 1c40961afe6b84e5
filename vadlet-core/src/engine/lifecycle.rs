//! Bootstrap state machine gating the real-time pipeline.
//!
//! ```text
//! Unstarted ─context created─► ContextCreated ─thread started─► ThreadStarted
//!     ─processor registered─► ProcessorRegistered ─node created─► NodeCreated
//!     ─ready flag set─► Ready
//!
//! any stage failure / out-of-order completion ─► Failed   (absorbing)
//! ```
//!
//! Progress is strictly linear. There are no retries and no way back from
//! `Ready` or `Failed`; a fresh lifecycle needs a fresh engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VadletError};

/// Where the bootstrap sequence currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Unstarted,
    ContextCreated,
    ThreadStarted,
    ProcessorRegistered,
    NodeCreated,
    /// The pipeline may receive real-time calls.
    Ready,
    /// A stage failed. Absorbing.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::ContextCreated => "context-created",
            LifecycleState::ThreadStarted => "thread-started",
            LifecycleState::ProcessorRegistered => "processor-registered",
            LifecycleState::NodeCreated => "node-created",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One asynchronous completion the host must deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ContextCreation,
    ThreadStart,
    ProcessorRegistration,
    NodeCreation,
    ReadyFlag,
}

impl Stage {
    /// State reached when this stage completes successfully.
    pub fn target(self) -> LifecycleState {
        match self {
            Stage::ContextCreation => LifecycleState::ContextCreated,
            Stage::ThreadStart => LifecycleState::ThreadStarted,
            Stage::ProcessorRegistration => LifecycleState::ProcessorRegistered,
            Stage::NodeCreation => LifecycleState::NodeCreated,
            Stage::ReadyFlag => LifecycleState::Ready,
        }
    }

    /// The stage that must complete next from `state`, if any.
    pub fn after(state: LifecycleState) -> Option<Stage> {
        match state {
            LifecycleState::Unstarted => Some(Stage::ContextCreation),
            LifecycleState::ContextCreated => Some(Stage::ThreadStart),
            LifecycleState::ThreadStarted => Some(Stage::ProcessorRegistration),
            LifecycleState::ProcessorRegistered => Some(Stage::NodeCreation),
            LifecycleState::NodeCreated => Some(Stage::ReadyFlag),
            LifecycleState::Ready | LifecycleState::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ContextCreation => "context creation",
            Stage::ThreadStart => "worklet thread start",
            Stage::ProcessorRegistration => "processor registration",
            Stage::NodeCreation => "node creation",
            Stage::ReadyFlag => "ready flag",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct WorkletLifecycle {
    state: LifecycleState,
    /// Stage that moved the machine to `Failed`.
    failed_at: Option<Stage>,
}

impl Default for WorkletLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkletLifecycle {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unstarted,
            failed_at: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn next_stage(&self) -> Option<Stage> {
        Stage::after(self.state)
    }

    pub fn failed_at(&self) -> Option<Stage> {
        self.failed_at
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.state == LifecycleState::Failed
    }

    /// `Ready` or `Failed`: no further signal is accepted.
    pub fn is_terminal(&self) -> bool {
        self.is_ready() || self.is_failed()
    }

    /// Apply the completion signal of `stage`.
    ///
    /// # Errors
    /// - `VadletError::InvalidState` when already terminal (state unchanged).
    /// - `VadletError::Lifecycle` when the stage failed or arrived out of
    ///   order; the machine is then `Failed`.
    pub fn advance(
        &mut self,
        stage: Stage,
        outcome: std::result::Result<(), String>,
    ) -> Result<LifecycleState> {
        let Some(expected) = self.next_stage() else {
            return Err(VadletError::InvalidState(format!(
                "lifecycle is {} and accepts no further signals ({stage} received)",
                self.state
            )));
        };

        if stage != expected {
            return Err(self.fail(
                stage,
                format!("completion arrived out of order, expected {expected}"),
            ));
        }

        match outcome {
            Ok(()) => {
                self.state = stage.target();
                Ok(self.state)
            }
            Err(detail) => Err(self.fail(stage, detail)),
        }
    }

    /// Force `Failed`, attributing the failure to `stage`.
    ///
    /// Returns the matching error for the caller to propagate. Has no effect
    /// on the state once `Ready` or `Failed`.
    pub fn fail(&mut self, stage: Stage, detail: impl Into<String>) -> VadletError {
        if !self.is_terminal() {
            self.state = LifecycleState::Failed;
            self.failed_at = Some(stage);
        }
        VadletError::Lifecycle {
            stage,
            detail: detail.into(),
        }
    }

    /// Force `Failed` without a stage (e.g. the classifier could not be built).
    pub fn abort(&mut self) {
        if !self.is_terminal() {
            self.state = LifecycleState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCE: [Stage; 5] = [
        Stage::ContextCreation,
        Stage::ThreadStart,
        Stage::ProcessorRegistration,
        Stage::NodeCreation,
        Stage::ReadyFlag,
    ];

    #[test]
    fn linear_progress_reaches_ready() {
        let mut lc = WorkletLifecycle::new();
        let mut seen = Vec::new();
        for stage in SEQUENCE {
            seen.push(lc.advance(stage, Ok(())).expect("stage succeeds"));
        }
        assert_eq!(
            seen,
            vec![
                LifecycleState::ContextCreated,
                LifecycleState::ThreadStarted,
                LifecycleState::ProcessorRegistered,
                LifecycleState::NodeCreated,
                LifecycleState::Ready,
            ]
        );
        assert!(lc.is_ready());
        assert!(lc.next_stage().is_none());
    }

    #[test]
    fn stage_failure_is_absorbing() {
        let mut lc = WorkletLifecycle::new();
        lc.advance(Stage::ContextCreation, Ok(())).expect("context");
        lc.advance(Stage::ThreadStart, Ok(())).expect("thread");

        let err = lc
            .advance(Stage::ProcessorRegistration, Err("no processor".into()))
            .expect_err("registration fails");
        assert!(matches!(
            err,
            VadletError::Lifecycle {
                stage: Stage::ProcessorRegistration,
                ..
            }
        ));
        assert!(lc.is_failed());
        assert_eq!(lc.failed_at(), Some(Stage::ProcessorRegistration));

        // No retry and no further progress.
        assert!(matches!(
            lc.advance(Stage::ProcessorRegistration, Ok(())),
            Err(VadletError::InvalidState(_))
        ));
        assert!(lc.is_failed());
    }

    #[test]
    fn out_of_order_completion_fails() {
        let mut lc = WorkletLifecycle::new();
        let err = lc
            .advance(Stage::NodeCreation, Ok(()))
            .expect_err("node before context");
        assert!(err.is_terminal());
        assert!(lc.is_failed());
        assert_eq!(lc.failed_at(), Some(Stage::NodeCreation));
    }

    #[test]
    fn ready_rejects_further_signals_without_changing_state() {
        let mut lc = WorkletLifecycle::new();
        for stage in SEQUENCE {
            lc.advance(stage, Ok(())).expect("stage");
        }
        assert!(lc.advance(Stage::ReadyFlag, Ok(())).is_err());
        let _ = lc.fail(Stage::ReadyFlag, "late failure");
        lc.abort();
        assert!(lc.is_ready());
    }

    #[test]
    fn abort_before_any_stage() {
        let mut lc = WorkletLifecycle::new();
        lc.abort();
        assert!(lc.is_failed());
        assert_eq!(lc.failed_at(), None);
        assert!(lc.next_stage().is_none());
    }
}
