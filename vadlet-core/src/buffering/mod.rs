//! Frame accumulation on a bounded SPSC ring buffer.
//!
//! Uses `ringbuf::HeapRb<i16>`: storage is allocated once at construction and
//! `push_slice` / `pop_slice` are wait-free, so both are safe to call from the
//! real-time audio callback.
//!
//! Overflow policy is drop-on-full. A sustained overflow means the producer
//! outruns the frame-draining loop, which the pipeline prevents by draining
//! every full frame within the same quantum.

pub mod frame;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use self::frame::AnalysisFrame;

/// Default ring capacity in analysis-rate samples.
pub const DEFAULT_RING_CAPACITY: usize = 1024;

/// Bounded FIFO of analysis samples that yields fixed-length frames.
pub struct FrameAccumulator {
    producer: HeapProd<i16>,
    consumer: HeapCons<i16>,
    capacity: usize,
    /// Pre-allocated frame storage handed out by `try_take_frame`.
    frame: Box<[i16]>,
}

impl FrameAccumulator {
    /// Allocate a ring of `capacity` samples producing `frame_length`-sample frames.
    ///
    /// Both values are clamped to at least 1. Allocation happens here, never
    /// on the push/take path.
    pub fn new(capacity: usize, frame_length: usize) -> Self {
        let capacity = capacity.max(1);
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        Self {
            producer,
            consumer,
            capacity,
            frame: vec![0i16; frame_length.max(1)].into_boxed_slice(),
        }
    }

    /// Append as many samples as fit; returns how many were accepted.
    pub fn push(&mut self, samples: &[i16]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Remove the oldest `frame_length` samples, if that many are buffered.
    pub fn try_take_frame(&mut self) -> Option<AnalysisFrame<'_>> {
        if self.consumer.occupied_len() < self.frame.len() {
            return None;
        }
        let taken = self.consumer.pop_slice(&mut self.frame);
        debug_assert_eq!(taken, self.frame.len());
        Some(AnalysisFrame::new(&self.frame))
    }

    /// Samples currently buffered.
    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_length(&self) -> usize {
        self.frame.len()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.consumer.clear();
    }
}

impl std::fmt::Debug for FrameAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameAccumulator")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("frame_length", &self.frame.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: i16, len: usize) -> Vec<i16> {
        (0..len as i16).map(|i| start + i).collect()
    }

    #[test]
    fn no_frame_until_full() {
        let mut acc = FrameAccumulator::new(1024, 160);
        assert_eq!(acc.push(&ramp(0, 159)), 159);
        assert!(acc.try_take_frame().is_none());
        assert_eq!(acc.len(), 159);

        assert_eq!(acc.push(&[159]), 1);
        let frame = acc.try_take_frame().expect("frame after 160 samples");
        assert_eq!(frame.len(), 160);
        assert_eq!(frame.samples(), ramp(0, 160).as_slice());
        assert!(acc.is_empty());
    }

    #[test]
    fn frames_come_out_in_fifo_order() {
        let mut acc = FrameAccumulator::new(64, 4);
        acc.push(&ramp(0, 10));
        assert_eq!(acc.try_take_frame().map(|f| f.samples().to_vec()), Some(vec![0, 1, 2, 3]));
        assert_eq!(acc.try_take_frame().map(|f| f.samples().to_vec()), Some(vec![4, 5, 6, 7]));
        assert!(acc.try_take_frame().is_none());
        assert_eq!(acc.len(), 2);

        acc.push(&ramp(10, 2));
        assert_eq!(acc.try_take_frame().map(|f| f.samples().to_vec()), Some(vec![8, 9, 10, 11]));
    }

    #[test]
    fn overflow_truncates_instead_of_failing() {
        let mut acc = FrameAccumulator::new(8, 4);
        assert_eq!(acc.push(&ramp(0, 6)), 6);
        assert_eq!(acc.push(&ramp(6, 6)), 2);
        assert_eq!(acc.len(), 8);
        assert_eq!(acc.push(&[99]), 0);

        // The accepted prefix survives; the excess is gone.
        assert_eq!(acc.try_take_frame().map(|f| f.samples().to_vec()), Some(vec![0, 1, 2, 3]));
        assert_eq!(acc.try_take_frame().map(|f| f.samples().to_vec()), Some(vec![4, 5, 6, 7]));
        assert!(acc.is_empty());
    }

    #[test]
    fn count_stays_within_bounds_over_mixed_operations() {
        let mut acc = FrameAccumulator::new(100, 30);
        let mut expected_next = 0i16;
        let mut produced = 0i16;
        for step in 0..200usize {
            let chunk = ramp(produced, (step * 7) % 45);
            let accepted = acc.push(&chunk);
            produced += accepted as i16;
            assert!(acc.len() <= acc.capacity());

            if step % 3 == 0 {
                while let Some(frame) = acc.try_take_frame() {
                    assert_eq!(frame.samples()[0], expected_next);
                    expected_next += 30;
                }
                assert!(acc.len() < 30);
            }
            if produced > 20_000 {
                break;
            }
        }
    }

    #[test]
    fn clear_empties_ring() {
        let mut acc = FrameAccumulator::new(32, 8);
        acc.push(&ramp(0, 20));
        acc.clear();
        assert!(acc.is_empty());
        assert!(acc.try_take_frame().is_none());
    }
}
