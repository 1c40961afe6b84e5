//! Event types crossing from the real-time side to the control side.
//!
//! | Event | Produced by | Cadence |
//! |-------|-------------|---------|
//! | `VadDecisionEvent` | `DecisionNotifier::post` | once per classified frame |
//! | `LevelEvent` | `DecisionNotifier::post_level` | every N quanta, when enabled |
//! | `LifecycleStatusEvent` | `VadletEngine` | on each lifecycle transition |

use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::LifecycleState;

// ---------------------------------------------------------------------------
// Real-time events
// ---------------------------------------------------------------------------

/// One classified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadDecisionEvent {
    /// Monotonically increasing decision sequence number.
    pub seq: u64,
    /// 1 = voice, 0 = no voice. Error outcomes are never sent.
    pub code: u8,
}

impl VadDecisionEvent {
    pub fn is_voice(&self) -> bool {
        self.code == 1
    }
}

/// Input level report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelEvent {
    pub seq: u64,
    /// RMS of the quantum across all channels, scaled by 1000.
    pub magnitude: u32,
}

/// Everything the real-time side posts, in posting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkletEvent {
    Decision(VadDecisionEvent),
    Level(LevelEvent),
}

// ---------------------------------------------------------------------------
// Control-side events
// ---------------------------------------------------------------------------

/// Broadcast by the engine whenever the lifecycle state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleStatusEvent {
    pub state: LifecycleState,
    /// Optional human-readable detail (e.g. the failing stage's message).
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_event_is_tagged() {
        let event = WorkletEvent::Decision(VadDecisionEvent { seq: 4, code: 1 });
        let json = serde_json::to_value(event).expect("serialize decision");
        assert_eq!(json["type"], "decision");
        assert_eq!(json["seq"], 4);
        assert_eq!(json["code"], 1);

        let back: WorkletEvent = serde_json::from_value(json).expect("deserialize decision");
        assert_eq!(back, event);
    }

    #[test]
    fn level_event_is_tagged() {
        let event = WorkletEvent::Level(LevelEvent {
            seq: 2,
            magnitude: 250,
        });
        let json = serde_json::to_value(event).expect("serialize level");
        assert_eq!(json["type"], "level");
        assert_eq!(json["magnitude"], 250);
    }

    #[test]
    fn status_event_uses_lowercase_state() {
        let event = LifecycleStatusEvent {
            state: LifecycleState::ProcessorRegistered,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize status");
        assert_eq!(json["state"], "processorregistered");
        assert!(json["detail"].is_null());

        let invalid = r#"{"state":"Ready","detail":null}"#;
        assert!(serde_json::from_str::<LifecycleStatusEvent>(invalid).is_err());
    }
}
