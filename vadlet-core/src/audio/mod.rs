//! Host audio quanta.
//!
//! # Design constraints
//!
//! The host delivers one quantum per real-time tick on its audio thread. Code
//! touching these views **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! Both views are borrowed slices over host-owned memory, so constructing them
//! is free and nothing here outlives the callback.
//!
//! # Layout
//!
//! Samples are planar, channel-major: sample `i` of channel `ch` lives at
//! `data[ch * frames + i]`, the same layout a Web Audio render quantum uses.

pub mod meter;
pub mod resample;

/// Web Audio render quantum size (frames per channel per tick).
pub const RENDER_QUANTUM_FRAMES: usize = 128;

/// Read-only view of one input quantum.
#[derive(Debug, Clone, Copy)]
pub struct AudioQuantum<'a> {
    data: &'a [f32],
    channels: usize,
    frames: usize,
}

impl<'a> AudioQuantum<'a> {
    /// Wrap planar `data` holding `channels` channels.
    ///
    /// Trailing samples that do not make up a whole frame are ignored.
    /// `channels == 0` yields an empty quantum.
    pub fn planar(data: &'a [f32], channels: usize) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        Self {
            data,
            channels,
            frames,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Samples of channel `ch`, or an empty slice when out of range.
    pub fn channel(&self, ch: usize) -> &'a [f32] {
        if ch >= self.channels {
            return &[];
        }
        let start = ch * self.frames;
        &self.data[start..start + self.frames]
    }

    /// Every sample of every channel, planar.
    pub fn samples(&self) -> &'a [f32] {
        &self.data[..self.channels * self.frames]
    }
}

/// Writable view of one output quantum.
#[derive(Debug)]
pub struct AudioQuantumMut<'a> {
    data: &'a mut [f32],
    channels: usize,
    frames: usize,
}

impl<'a> AudioQuantumMut<'a> {
    pub fn planar(data: &'a mut [f32], channels: usize) -> Self {
        let frames = if channels == 0 { 0 } else { data.len() / channels };
        Self {
            data,
            channels,
            frames,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn samples(&self) -> &[f32] {
        &self.data[..self.channels * self.frames]
    }

    /// Copy `input` verbatim when both quanta have the same shape.
    ///
    /// Returns `false` (and leaves the output untouched) on a shape mismatch.
    pub fn copy_from(&mut self, input: &AudioQuantum<'_>) -> bool {
        if self.channels != input.channels() || self.frames != input.frames() {
            return false;
        }
        let len = self.channels * self.frames;
        self.data[..len].copy_from_slice(input.samples());
        true
    }
}
