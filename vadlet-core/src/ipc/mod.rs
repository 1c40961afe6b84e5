//! Real-time → control hand-off.
//!
//! Event types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them verbatim (the reference host prints them as JSON lines).

pub mod events;
pub mod notifier;
