//! Input level meter.
//!
//! Computes the RMS of every channel of a quantum and reports it as an integer
//! magnitude (`rms * 1000`) once every `interval` quanta, starting with the
//! first one. Used for visual feedback; it never affects classification.

use crate::audio::AudioQuantum;

#[derive(Debug, Clone)]
pub struct LevelMeter {
    interval: u32,
    quanta_seen: u32,
}

impl LevelMeter {
    /// `interval` is clamped to at least 1 (report every quantum).
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            quanta_seen: 0,
        }
    }

    /// Feed one quantum. Returns a magnitude on reporting quanta.
    pub fn observe(&mut self, quantum: &AudioQuantum<'_>) -> Option<u32> {
        let due = self.quanta_seen % self.interval == 0;
        self.quanta_seen = self.quanta_seen.wrapping_add(1);
        if !due {
            return None;
        }
        let samples = quantum.samples();
        if samples.is_empty() {
            return None;
        }
        Some((rms(samples) * 1000.0) as u32)
    }
}

/// Root-mean-square of a sample slice (0.0 for an empty slice).
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}
