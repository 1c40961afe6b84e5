//! Linear-interpolation sample-rate conversion to the analysis rate.
//!
//! ## Design
//!
//! Hosts render at their native rate (commonly 48 kHz). The classifier needs
//! 16-bit PCM at one of a few fixed rates. `resample_into` bridges that gap on
//! the real-time thread, so it is stateless and writes only into a
//! caller-owned buffer: no allocation, no carried phase between quanta.
//!
//! ## Usage
//!
//! ```
//! use vadlet_core::audio::resample::{max_output_len, resample_into};
//!
//! let quantum = [0.0f32; 128];
//! let mut out = vec![0i16; max_output_len(128, 48_000, 16_000)];
//! let n = resample_into(&quantum, 48_000, 16_000, &mut out);
//! assert_eq!(n, 42);
//! ```

/// Number of samples `resample_into` produces for `input_len` samples before
/// any capacity clamp: `floor(input_len * output_rate / input_rate)`.
pub fn max_output_len(input_len: usize, input_rate: u32, output_rate: u32) -> usize {
    if input_rate == 0 {
        return 0;
    }
    ((input_len as u64 * output_rate as u64) / input_rate as u64) as usize
}

/// Resample `input` from `input_rate` to `output_rate` and convert to `i16`.
///
/// Returns the number of samples written to `out`. Output beyond `out.len()`
/// is silently truncated.
pub fn resample_into(input: &[f32], input_rate: u32, output_rate: u32, out: &mut [i16]) -> usize {
    let expected = max_output_len(input.len(), input_rate, output_rate).min(out.len());
    let r_in = input_rate as u64;
    let r_out = output_rate as u64;

    let mut written = 0;
    for (i, slot) in out.iter_mut().take(expected).enumerate() {
        // Source position i * r_in / r_out, split into integer and fraction.
        let pos = i as u64 * r_in;
        let i0 = (pos / r_out) as usize;
        let frac = (pos % r_out) as f32 / r_out as f32;

        let sample = match (input.get(i0), input.get(i0 + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            _ => break,
        };

        *slot = to_i16(sample);
        written += 1;
    }
    written
}

/// Scale a float sample by 32768 and saturate to the `i16` range.
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    let scaled = (sample * 32_768.0) as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
