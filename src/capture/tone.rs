//! Synthetic tone channel: a deterministic sine source shaped like the
//! hardware path (raw slot words, frame-sized reads). Stands in for the line
//! input on machines without a capture device and in tests.

use std::f64::consts::PI;
use std::time::Duration;

use super::{CaptureChannel, CaptureError, ChannelConfig, SampleFormat};

pub struct ToneGenerator {
    sample_rate: u32,
    freq_hz: f64,
    amplitude: f32,
    format: SampleFormat,
    frame_len: usize,
    /// Absolute sample index; keeps phase continuous across reads.
    position: u64,
    paced: bool,
    enabled: bool,
}

impl ToneGenerator {
    /// Tone at half full scale, paced to wall-clock like real hardware.
    pub fn new(cfg: &ChannelConfig, freq_hz: f64) -> Self {
        Self {
            sample_rate: cfg.sample_rate,
            freq_hz,
            amplitude: 0.5 * cfg.format.full_scale(),
            format: cfg.format,
            frame_len: cfg.frame_len,
            position: 0,
            paced: true,
            enabled: false,
        }
    }

    /// Disables real-time pacing; reads return immediately. Test hook.
    #[cfg(test)]
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn sample(&self, index: u64) -> f32 {
        let t = index as f64 / self.sample_rate as f64;
        ((2.0 * PI * self.freq_hz * t).sin() * self.amplitude as f64) as f32
    }
}

impl CaptureChannel for ToneGenerator {
    fn enable(&mut self) -> Result<(), CaptureError> {
        self.enabled = true;
        Ok(())
    }

    fn read(&mut self, frame: &mut [i32], _timeout: Duration) -> Result<usize, CaptureError> {
        if !self.enabled {
            return Err(CaptureError::NotEnabled);
        }
        let n = frame.len().min(self.frame_len);
        for (i, slot) in frame[..n].iter_mut().enumerate() {
            *slot = self.format.pack(self.sample(self.position + i as u64));
        }
        self.position += n as u64;
        if self.paced {
            std::thread::sleep(Duration::from_secs_f64(n as f64 / self.sample_rate as f64));
        }
        Ok(n)
    }

    fn disable(&mut self) {
        self.enabled = false;
    }
}
