//! Fire-and-forget delivery of decisions to the control side.
//!
//! The transport is a bounded `crossbeam-channel`. Its slots are allocated
//! when the channel is created and `try_send` never blocks, so posting is
//! safe on the real-time thread. The channel is FIFO, which keeps decisions
//! in frame order.
//!
//! A full or disconnected channel drops the event and bumps a counter; the
//! real-time side never learns about it. Level reports stop at half capacity
//! so they cannot crowd out decisions.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::debug;

use crate::engine::pipeline::PipelineDiagnostics;
use crate::ipc::events::{LevelEvent, VadDecisionEvent, WorkletEvent};
use crate::vad::Decision;

/// Default channel capacity: 256 events buffered for a slow consumer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Create the bounded transport. `capacity` is clamped to at least 1.
pub fn event_channel(capacity: usize) -> (Sender<WorkletEvent>, EventReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (tx, EventReceiver { rx })
}

/// Real-time half: posts decisions and level reports.
pub struct DecisionNotifier {
    tx: Sender<WorkletEvent>,
    decision_seq: u64,
    level_seq: u64,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl DecisionNotifier {
    pub fn new(tx: Sender<WorkletEvent>, diagnostics: Arc<PipelineDiagnostics>) -> Self {
        Self {
            tx,
            decision_seq: 0,
            level_seq: 0,
            diagnostics,
        }
    }

    /// Post one decision. `Decision::Error` is not delivered.
    ///
    /// Returns `true` if the event was handed to the transport.
    pub fn post(&mut self, decision: Decision) -> bool {
        let Some(code) = decision.code() else {
            return false;
        };
        let event = WorkletEvent::Decision(VadDecisionEvent {
            seq: self.decision_seq,
            code,
        });
        self.decision_seq = self.decision_seq.wrapping_add(1);

        if self.tx.try_send(event).is_ok() {
            self.diagnostics
                .decisions_posted
                .fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.diagnostics
                .decisions_dropped
                .fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Post an input level report.
    ///
    /// Levels are lower priority than decisions: a report is dropped once the
    /// channel is at least half full, leaving the rest for decisions.
    pub fn post_level(&mut self, magnitude: u32) -> bool {
        let event = WorkletEvent::Level(LevelEvent {
            seq: self.level_seq,
            magnitude,
        });
        self.level_seq = self.level_seq.wrapping_add(1);

        let crowded = self
            .tx
            .capacity()
            .is_some_and(|cap| cap > 1 && self.tx.len() * 2 >= cap);
        if !crowded && self.tx.try_send(event).is_ok() {
            self.diagnostics.level_reports.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.diagnostics.levels_dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

/// Control half of the transport.
pub struct EventReceiver {
    rx: Receiver<WorkletEvent>,
}

impl EventReceiver {
    /// Next event if one is queued.
    pub fn try_recv(&self) -> Option<WorkletEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` on timeout or once every sender is gone and the queue
    /// is drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkletEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain every queued event.
    pub fn drain(&self) -> Vec<WorkletEvent> {
        self.rx.try_iter().collect()
    }

    /// Drain every queued event, keeping only decisions.
    pub fn drain_decisions(&self) -> Vec<VadDecisionEvent> {
        self.rx
            .try_iter()
            .filter_map(|ev| match ev {
                WorkletEvent::Decision(d) => Some(d),
                WorkletEvent::Level(_) => None,
            })
            .collect()
    }

    /// Run `on_event` for every event on a dedicated control thread.
    ///
    /// The thread exits once the engine (the last sender) is dropped and the
    /// queue is drained.
    pub fn spawn_listener<F>(self, mut on_event: F) -> std::io::Result<JoinHandle<()>>
    where
        F: FnMut(WorkletEvent) + Send + 'static,
    {
        std::thread::Builder::new()
            .name("vadlet-events".into())
            .spawn(move || {
                let mut delivered = 0u64;
                for event in self.rx.iter() {
                    on_event(event);
                    delivered += 1;
                }
                debug!(delivered, "event listener finished");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(capacity: usize) -> (DecisionNotifier, EventReceiver, Arc<PipelineDiagnostics>) {
        let diagnostics = Arc::new(PipelineDiagnostics::default());
        let (tx, rx) = event_channel(capacity);
        (
            DecisionNotifier::new(tx, Arc::clone(&diagnostics)),
            rx,
            diagnostics,
        )
    }

    #[test]
    fn error_decisions_are_not_delivered() {
        let (mut n, rx, diag) = notifier(8);
        assert!(!n.post(Decision::Error));
        assert!(n.post(Decision::NoVoice));
        assert!(n.post(Decision::Voice));

        let got = rx.drain_decisions();
        let codes: Vec<u8> = got.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![0, 1]);
        assert_eq!(got[0].seq, 0);
        assert_eq!(got[1].seq, 1);
        assert_eq!(diag.snapshot().decisions_posted, 2);
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (mut n, rx, diag) = notifier(2);
        assert!(n.post(Decision::Voice));
        assert!(n.post(Decision::Voice));
        assert!(!n.post(Decision::NoVoice));
        assert_eq!(diag.snapshot().decisions_dropped, 1);
        assert_eq!(rx.drain().len(), 2);
    }

    #[test]
    fn closed_receiver_is_absorbed() {
        let (mut n, rx, diag) = notifier(4);
        drop(rx);
        assert!(!n.post(Decision::Voice));
        assert_eq!(diag.snapshot().decisions_dropped, 1);
    }

    #[test]
    fn levels_share_the_ordered_transport() {
        let (mut n, rx, _) = notifier(8);
        n.post_level(120);
        n.post(Decision::Voice);
        n.post_level(80);

        let events = rx.drain();
        assert!(matches!(events[0], WorkletEvent::Level(LevelEvent { seq: 0, magnitude: 120 })));
        assert!(matches!(events[1], WorkletEvent::Decision(VadDecisionEvent { seq: 0, code: 1 })));
        assert!(matches!(events[2], WorkletEvent::Level(LevelEvent { seq: 1, magnitude: 80 })));
    }

    #[test]
    fn levels_yield_half_the_channel_to_decisions() {
        let (mut n, rx, diag) = notifier(4);
        assert!(n.post_level(10));
        assert!(n.post(Decision::Voice));
        assert!(!n.post_level(20), "channel half full");
        assert!(n.post(Decision::NoVoice));
        assert!(n.post(Decision::Voice));

        let snap = diag.snapshot();
        assert_eq!(snap.level_reports, 1);
        assert_eq!(snap.levels_dropped, 1);
        assert_eq!(snap.decisions_dropped, 0);
        assert_eq!(rx.drain_decisions().len(), 3);
        assert!(!n.post_level(30), "receiver gone");
        assert_eq!(diag.snapshot().levels_dropped, 2);
    }

    #[test]
    fn listener_sees_every_event_then_exits() {
        let (mut n, rx, _) = notifier(16);
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let handle = rx
            .spawn_listener(move |ev| {
                let _ = seen_tx.send(ev);
            })
            .expect("spawn listener");

        n.post(Decision::NoVoice);
        n.post(Decision::Voice);
        drop(n);
        handle.join().expect("listener thread panicked");

        let seen: Vec<WorkletEvent> = seen_rx.try_iter().collect();
        assert_eq!(seen.len(), 2);
    }
}
