//! The capture loop: one task driving channel reads, conditioning, the
//! transform, power computation, and rendering, in strict phase order.

pub mod condition;

use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::capture::{CaptureChannel, CaptureError, SampleFormat};
use crate::dsp::fft::FftEngine;
use crate::dsp::window;
use crate::render::view::SpectrumView;

/// Stands in for log(0) on silent bins; keeps every rendered value finite.
pub const POWER_FLOOR_DB: f32 = -200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Ready,
    Capturing,
    Processing,
    Faulted,
}

/// Outcome of one pass through the loop body.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// A frame was conditioned, transformed and turned into a spectrum.
    Frame { samples: usize, avg_amplitude: f32 },
    /// The read timed out; previous spectrum left intact.
    TimedOut,
    /// Transient backend failure; previous spectrum left intact.
    ReadFailed,
    /// The frame length cannot feed a radix-2 transform; dropped.
    Skipped { samples: usize },
}

pub struct PipelineConfig {
    pub fft_size: usize,
    pub max_fft_size: usize,
    pub sample_rate: u32,
    pub format: SampleFormat,
    pub read_timeout: Duration,
    /// Rate limit between rendered frames. Too large risks upstream
    /// overruns; surfaced by the overrun counter, not prevented.
    pub frame_delay: Duration,
    /// Stop after this many rendered frames; 0 runs until torn down.
    pub max_frames: u64,
}

/// All pipeline storage, allocated once and reused every iteration.
struct BufferPool {
    /// Raw slot words as read from the channel.
    raw: Vec<i32>,
    /// Hann coefficients, immutable after startup.
    window: Vec<f32>,
    /// Interleaved (re, im) pairs; filled, transformed and finally
    /// overwritten with power values, one phase at a time.
    work: Vec<f32>,
}

pub struct SpectrumPipeline {
    cfg: PipelineConfig,
    fft: FftEngine,
    pool: BufferPool,
    state: State,
    /// Valid prefix of `work` holding the latest power spectrum.
    spectrum_len: usize,
    frames: u64,
    timeouts: u64,
    read_errors: u64,
    last_overruns: u64,
}

impl SpectrumPipeline {
    /// Builds the window table, twiddle tables and buffer pool. Everything
    /// here is fatal on failure: without the tables no processing can run.
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        ensure!(cfg.sample_rate > 0, "sample rate must be nonzero");
        ensure!(
            cfg.fft_size >= 2 && cfg.fft_size.is_power_of_two(),
            "transform size {} is not a supported power of two",
            cfg.fft_size
        );
        ensure!(
            cfg.fft_size <= cfg.max_fft_size,
            "transform size {} exceeds the configured maximum {}",
            cfg.fft_size,
            cfg.max_fft_size
        );
        let fft = FftEngine::new(cfg.max_fft_size)
            .context("failed to initialize FFT twiddle tables")?;
        log::debug!(
            "FFT engine ready: tables sized for up to {}-point transforms",
            fft.max_size()
        );
        let pool = BufferPool {
            raw: vec![0; cfg.fft_size],
            window: window::hann(cfg.fft_size),
            work: vec![0.0; 2 * cfg.fft_size],
        };
        Ok(Self {
            cfg,
            fft,
            pool,
            state: State::Ready,
            spectrum_len: 0,
            frames: 0,
            timeouts: 0,
            read_errors: 0,
            last_overruns: 0,
        })
    }

    /// The latest power spectrum, dB per bin. Empty until the first frame;
    /// overwritten by the next processed frame.
    pub fn spectrum(&self) -> &[f32] {
        &self.pool.work[..self.spectrum_len]
    }

    /// One pass: blocking timed read, then (on success) the full
    /// conditioning/transform/power phase sequence.
    pub fn step(&mut self, channel: &mut dyn CaptureChannel) -> Result<Step> {
        ensure!(
            self.state != State::Faulted,
            "capture loop is faulted and cannot continue"
        );
        self.state = State::Capturing;
        let samples = match channel.read(&mut self.pool.raw, self.cfg.read_timeout) {
            Ok(n) => n,
            Err(CaptureError::Timeout(t)) => {
                self.timeouts += 1;
                log::warn!("channel read timed out after {:?}, retrying", t);
                return Ok(Step::TimedOut);
            }
            Err(err @ CaptureError::Backend(_)) => {
                self.read_errors += 1;
                log::warn!("channel read failed: {err}");
                return Ok(Step::ReadFailed);
            }
            Err(err) => {
                // Disconnected / not enabled: no data will ever arrive.
                self.state = State::Faulted;
                return Err(err).context("capture channel is unusable");
            }
        };

        if samples < 2 || !samples.is_power_of_two() || samples > self.cfg.fft_size {
            log::warn!("dropping ragged frame of {} samples", samples);
            return Ok(Step::Skipped { samples });
        }

        self.state = State::Processing;
        match self.process(samples) {
            Ok(avg_amplitude) => {
                self.frames += 1;
                Ok(Step::Frame {
                    samples,
                    avg_amplitude,
                })
            }
            Err(err) => {
                self.state = State::Faulted;
                Err(err)
            }
        }
    }

    /// Phases over the working buffer, in order: fill, transform,
    /// bit-reverse, unpack, power. Each phase owns the buffer exclusively.
    fn process(&mut self, n: usize) -> Result<f32> {
        let BufferPool { raw, window, work } = &mut self.pool;
        let avg = condition::condition(&raw[..n], &self.cfg.format, window, work);

        self.fft.transform(work, n)?;
        self.fft.bit_reverse(work, n)?;
        self.fft.split_complex_to_two_real(work, n)?;

        // Overwrites the front of the buffer while reading ahead of it;
        // write index k never catches up with read index 2k.
        for k in 0..n / 2 {
            let re = work[2 * k];
            let im = work[2 * k + 1];
            let p = (re * re + im * im) / n as f32;
            work[k] = if p > 0.0 {
                10.0 * p.log10()
            } else {
                POWER_FLOOR_DB
            };
        }
        self.spectrum_len = n / 2;
        Ok(avg)
    }

    /// Runs until the frame budget is exhausted or the channel dies.
    pub fn run(&mut self, channel: &mut dyn CaptureChannel, view: &SpectrumView) -> Result<()> {
        log::info!(
            "Capture loop started: {}-point transform @ {} Hz",
            self.cfg.fft_size,
            self.cfg.sample_rate
        );
        loop {
            match self.step(channel)? {
                Step::Frame {
                    samples,
                    avg_amplitude,
                } => {
                    println!("{}", view.render(self.spectrum()));
                    let (peak_db, peak_hz) = self.peak();
                    log::info!(
                        "frame {}: {} samples, avg amplitude {:.2}, peak {:.1} dB @ {:.0} Hz",
                        self.frames,
                        samples,
                        avg_amplitude,
                        peak_db,
                        peak_hz
                    );
                    self.report_overruns(channel);
                    if self.cfg.max_frames != 0 && self.frames >= self.cfg.max_frames {
                        break;
                    }
                    std::thread::sleep(self.cfg.frame_delay);
                }
                // Recoverable skips already logged inside step.
                Step::TimedOut | Step::ReadFailed | Step::Skipped { .. } => {}
            }
        }
        log::info!(
            "Capture loop finished: {} frames, {} timeouts, {} read errors",
            self.frames,
            self.timeouts,
            self.read_errors
        );
        Ok(())
    }

    /// Dominant bin of the current spectrum as (dB, Hz).
    fn peak(&self) -> (f32, f32) {
        let spectrum = self.spectrum();
        if spectrum.is_empty() {
            return (POWER_FLOOR_DB, 0.0);
        }
        let mut best = (0usize, f32::NEG_INFINITY);
        for (i, &db) in spectrum.iter().enumerate() {
            if db > best.1 {
                best = (i, db);
            }
        }
        let hz = best.0 as f32 * self.cfg.sample_rate as f32 / (2.0 * spectrum.len() as f32);
        (best.1, hz)
    }

    fn report_overruns(&mut self, channel: &dyn CaptureChannel) {
        let overruns = channel.overruns();
        if overruns > self.last_overruns {
            log::warn!(
                "{} capture frame(s) dropped upstream while processing (total {})",
                overruns - self.last_overruns,
                overruns
            );
            self.last_overruns = overruns;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::tone::ToneGenerator;
    use crate::capture::{ChannelConfig, ChannelTopology, Justification};

    fn format() -> SampleFormat {
        SampleFormat::new(32, 24, Justification::Left).unwrap()
    }

    fn pipeline(fft_size: usize) -> SpectrumPipeline {
        SpectrumPipeline::new(config_with_fft_size(fft_size)).unwrap()
    }

    fn tone_channel(fft_size: usize, freq_hz: f64) -> ToneGenerator {
        let mut tone = ToneGenerator::new(
            &ChannelConfig {
                sample_rate: 16_000,
                topology: ChannelTopology::Simplex,
                device: None,
                frame_len: fft_size,
                format: format(),
            },
            freq_hz,
        )
        .unpaced();
        tone.enable().unwrap();
        tone
    }

    struct SilentChannel;
    impl CaptureChannel for SilentChannel {
        fn enable(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn read(&mut self, frame: &mut [i32], _: Duration) -> Result<usize, CaptureError> {
            frame.fill(0);
            Ok(frame.len())
        }
        fn disable(&mut self) {}
    }

    struct StalledChannel;
    impl CaptureChannel for StalledChannel {
        fn enable(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn read(&mut self, _: &mut [i32], timeout: Duration) -> Result<usize, CaptureError> {
            Err(CaptureError::Timeout(timeout))
        }
        fn disable(&mut self) {}
    }

    struct DeadChannel;
    impl CaptureChannel for DeadChannel {
        fn enable(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn read(&mut self, _: &mut [i32], _: Duration) -> Result<usize, CaptureError> {
            Err(CaptureError::Disconnected)
        }
        fn disable(&mut self) {}
    }

    struct RaggedChannel(usize);
    impl CaptureChannel for RaggedChannel {
        fn enable(&mut self) -> Result<(), CaptureError> {
            Ok(())
        }
        fn read(&mut self, frame: &mut [i32], _: Duration) -> Result<usize, CaptureError> {
            frame[..self.0].fill(0);
            Ok(self.0)
        }
        fn disable(&mut self) {}
    }

    fn config_with_fft_size(fft_size: usize) -> PipelineConfig {
        PipelineConfig {
            fft_size,
            max_fft_size: 4096,
            sample_rate: 16_000,
            format: format(),
            read_timeout: Duration::from_millis(10),
            frame_delay: Duration::ZERO,
            max_frames: 0,
        }
    }

    #[test]
    fn rejects_invalid_transform_sizes() {
        assert!(SpectrumPipeline::new(config_with_fft_size(1000)).is_err());
        assert!(SpectrumPipeline::new(config_with_fft_size(8192)).is_err());
        assert!(SpectrumPipeline::new(config_with_fft_size(2048)).is_ok());
    }

    #[test]
    fn silent_frame_yields_finite_floor_everywhere() {
        let mut pipeline = pipeline(256);
        let step = pipeline.step(&mut SilentChannel).unwrap();
        assert!(matches!(
            step,
            Step::Frame {
                samples: 256,
                avg_amplitude: a
            } if a == 0.0
        ));
        assert_eq!(pipeline.spectrum().len(), 128);
        for &db in pipeline.spectrum() {
            assert!(db.is_finite());
            assert_eq!(db, POWER_FLOOR_DB);
        }
    }

    #[test]
    fn tone_concentrates_power_in_expected_bin() {
        // 1 kHz @ 16 kHz into a 2048-point transform: bin 1000*2048/16000.
        let mut pipeline = pipeline(2048);
        let mut tone = tone_channel(2048, 1000.0);
        let step = pipeline.step(&mut tone).unwrap();

        let avg = match step {
            Step::Frame {
                samples,
                avg_amplitude,
            } => {
                assert_eq!(samples, 2048);
                avg_amplitude
            }
            other => panic!("unexpected step outcome {:?}", other),
        };
        // Mean |sin| of a half-scale 24-bit tone is about 0.628 * 2^22.
        assert!((2.5e6..2.8e6).contains(&avg), "avg amplitude {}", avg);

        let spectrum = pipeline.spectrum();
        assert_eq!(spectrum.len(), 1024);
        let peak_bin = (0..spectrum.len())
            .max_by(|&a, &b| spectrum[a].partial_cmp(&spectrum[b]).unwrap())
            .unwrap();
        assert_eq!(peak_bin, 128);
        // Outside the Hann main lobe and near sidelobes everything must sit
        // far below the peak.
        for (k, &db) in spectrum.iter().enumerate() {
            if k.abs_diff(peak_bin) >= 8 {
                assert!(
                    db < spectrum[peak_bin] - 40.0,
                    "bin {} at {} dB too close to peak {} dB",
                    k,
                    db,
                    spectrum[peak_bin]
                );
            }
        }
    }

    #[test]
    fn timeout_leaves_previous_spectrum_intact() {
        let mut pipeline = pipeline(2048);
        let mut tone = tone_channel(2048, 1000.0);
        pipeline.step(&mut tone).unwrap();
        let before: Vec<f32> = pipeline.spectrum().to_vec();

        let step = pipeline.step(&mut StalledChannel).unwrap();
        assert_eq!(step, Step::TimedOut);
        assert_eq!(pipeline.spectrum(), &before[..]);
        assert_ne!(pipeline.state, State::Faulted);

        // The loop must still be able to process the next good frame.
        assert!(matches!(
            pipeline.step(&mut tone).unwrap(),
            Step::Frame { .. }
        ));
    }

    #[test]
    fn ragged_frames_are_skipped_not_transformed() {
        let mut pipeline = pipeline(256);
        let step = pipeline.step(&mut RaggedChannel(100)).unwrap();
        assert_eq!(step, Step::Skipped { samples: 100 });
        assert!(pipeline.spectrum().is_empty());
    }

    #[test]
    fn disconnect_faults_the_pipeline() {
        let mut pipeline = pipeline(256);
        assert!(pipeline.step(&mut DeadChannel).is_err());
        assert_eq!(pipeline.state, State::Faulted);
        // Faulted is terminal.
        assert!(pipeline.step(&mut SilentChannel).is_err());
    }

    #[test]
    fn run_honors_frame_budget() {
        let mut cfg = config_with_fft_size(512);
        cfg.max_frames = 3;
        let mut pipeline = SpectrumPipeline::new(cfg).unwrap();
        let mut tone = tone_channel(512, 1000.0);
        let view = SpectrumView::new(64, 10, -120.0, 40.0, '|').unwrap();
        pipeline.run(&mut tone, &view).unwrap();
        assert_eq!(pipeline.frames, 3);
    }
}
