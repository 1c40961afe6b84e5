//! Typed analysis frames passed from the accumulator to the classifier.

use serde::{Deserialize, Serialize};

/// Sample rates the classifier accepts.
///
/// Any other rate is unrepresentable, so it can never reach the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnalysisRate {
    #[serde(rename = "8000")]
    Khz8,
    #[default]
    #[serde(rename = "16000")]
    Khz16,
    #[serde(rename = "32000")]
    Khz32,
}

impl AnalysisRate {
    pub fn hz(self) -> u32 {
        match self {
            AnalysisRate::Khz8 => 8_000,
            AnalysisRate::Khz16 => 16_000,
            AnalysisRate::Khz32 => 32_000,
        }
    }

    /// Map a raw rate onto a supported one.
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            8_000 => Some(AnalysisRate::Khz8),
            16_000 => Some(AnalysisRate::Khz16),
            32_000 => Some(AnalysisRate::Khz32),
            _ => None,
        }
    }
}

/// Frame durations the classifier accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameDuration {
    #[default]
    #[serde(rename = "10")]
    Ms10,
    #[serde(rename = "20")]
    Ms20,
    #[serde(rename = "30")]
    Ms30,
}

impl FrameDuration {
    pub fn millis(self) -> u32 {
        match self {
            FrameDuration::Ms10 => 10,
            FrameDuration::Ms20 => 20,
            FrameDuration::Ms30 => 30,
        }
    }

    pub fn from_millis(ms: u32) -> Option<Self> {
        match ms {
            10 => Some(FrameDuration::Ms10),
            20 => Some(FrameDuration::Ms20),
            30 => Some(FrameDuration::Ms30),
            _ => None,
        }
    }

    /// Samples per frame at `rate` (160 for 10 ms at 16 kHz).
    pub fn samples_at(self, rate: AnalysisRate) -> usize {
        (rate.hz() * self.millis() / 1000) as usize
    }
}

/// Exactly one frame of analysis-rate samples.
///
/// Borrowed from the accumulator's scratch space; it lives only until the
/// next frame is taken.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisFrame<'a> {
    samples: &'a [i16],
}

impl<'a> AnalysisFrame<'a> {
    pub(crate) fn new(samples: &'a [i16]) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &'a [i16] {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lengths() {
        assert_eq!(FrameDuration::Ms10.samples_at(AnalysisRate::Khz16), 160);
        assert_eq!(FrameDuration::Ms20.samples_at(AnalysisRate::Khz8), 160);
        assert_eq!(FrameDuration::Ms30.samples_at(AnalysisRate::Khz32), 960);
    }

    #[test]
    fn unsupported_rates_are_rejected() {
        assert_eq!(AnalysisRate::from_hz(16_000), Some(AnalysisRate::Khz16));
        assert_eq!(AnalysisRate::from_hz(44_100), None);
        assert_eq!(FrameDuration::from_millis(15), None);
    }

    #[test]
    fn rate_serializes_as_hz_string() {
        let json = serde_json::to_string(&AnalysisRate::Khz32).expect("serialize rate");
        assert_eq!(json, r#""32000""#);
        let back: AnalysisRate = serde_json::from_str(r#""8000""#).expect("deserialize rate");
        assert_eq!(back, AnalysisRate::Khz8);
    }
}
