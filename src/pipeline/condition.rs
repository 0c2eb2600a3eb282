//! Raw-slot conditioning: integer-to-float scaling, windowing, and packing
//! into the interleaved complex working buffer.

use crate::capture::SampleFormat;

/// Converts one frame of raw slots into the windowed complex working buffer
/// and returns the mean absolute amplitude (a diagnostic, not part of the
/// transform).
///
/// The imaginary slots are cleared in a second stride-2 pass: the working
/// buffer is reused every iteration, so they still hold values from the
/// previous frame.
pub fn condition(raw: &[i32], format: &SampleFormat, window: &[f32], work: &mut [f32]) -> f32 {
    debug_assert!(window.len() >= raw.len());
    debug_assert!(work.len() >= 2 * raw.len());

    let mut abs_sum = 0.0f32;
    for (i, &slot) in raw.iter().enumerate() {
        let amplitude = format.to_amplitude(slot);
        abs_sum += amplitude.abs();
        work[2 * i] = amplitude * window[i];
    }
    for im in work[..2 * raw.len()].iter_mut().skip(1).step_by(2) {
        *im = 0.0;
    }

    if raw.is_empty() {
        0.0
    } else {
        abs_sum / raw.len() as f32
    }
}
