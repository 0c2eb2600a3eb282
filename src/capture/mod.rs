//! Capture-channel boundary: the trait the pipeline reads frames through,
//! the raw slot-word format, and the concrete backends (cpal line input,
//! synthetic tone).

pub mod line_in;
pub mod tone;

use std::time::Duration;

use anyhow::{ensure, Result};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no samples arrived within {0:?}")]
    Timeout(Duration),
    #[error("capture channel disconnected")]
    Disconnected,
    #[error("channel is not enabled")]
    NotEnabled,
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// How the hardware channel pair is allocated. Wiring only; the processing
/// pipeline never sees this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChannelTopology {
    /// Capture and playback share one device (and therefore one clock).
    Duplex,
    /// Capture-only channel on a dedicated device.
    Simplex,
}

/// Where the sample sits inside its hardware slot word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Justification {
    /// Sample occupies the top `sample_bits` of the slot (e.g. 24-bit audio
    /// delivered left-aligned in a 32-bit slot).
    Left,
    /// Sample occupies the low `sample_bits`, sign bit at `sample_bits - 1`.
    Right,
}

/// Describes how raw slot words map to signed sample amplitudes.
///
/// The capture hardware delivers `slot_bits`-wide words that carry a
/// `sample_bits`-wide sample; both the width and the alignment vary with
/// wiring, so they are configuration rather than constants.
#[derive(Debug, Clone, Copy)]
pub struct SampleFormat {
    slot_bits: u32,
    sample_bits: u32,
    justification: Justification,
}

impl SampleFormat {
    pub fn new(slot_bits: u32, sample_bits: u32, justification: Justification) -> Result<Self> {
        ensure!(
            (1..=32).contains(&slot_bits),
            "slot width {} must be between 1 and 32 bits",
            slot_bits
        );
        ensure!(
            (1..=slot_bits).contains(&sample_bits),
            "sample depth {} must be between 1 and the slot width {}",
            sample_bits,
            slot_bits
        );
        Ok(Self {
            slot_bits,
            sample_bits,
            justification,
        })
    }

    /// Isolates the meaningful sample bits from one raw slot word.
    pub fn to_amplitude(&self, raw: i32) -> f32 {
        let value = match self.justification {
            Justification::Left => raw >> (self.slot_bits - self.sample_bits),
            Justification::Right => {
                let shift = 32 - self.sample_bits;
                (raw << shift) >> shift
            }
        };
        value as f32
    }

    /// Inverse of `to_amplitude`; builds the raw slot word a channel would
    /// deliver for the given sample value. Used by the synthetic backends.
    pub fn pack(&self, amplitude: f32) -> i32 {
        let limit = (1i64 << (self.sample_bits - 1)) - 1;
        let value = (amplitude as i64).clamp(-limit - 1, limit) as i32;
        match self.justification {
            Justification::Left => value << (self.slot_bits - self.sample_bits),
            Justification::Right => {
                let mask = (((1i64 << self.sample_bits) - 1) & 0xFFFF_FFFF) as u32;
                (value as u32 & mask) as i32
            }
        }
    }

    /// Full-scale positive amplitude for this sample depth.
    pub fn full_scale(&self) -> f32 {
        ((1i64 << (self.sample_bits - 1)) - 1) as f32
    }
}

/// Startup description of the capture channel, resolved once into a concrete
/// backend by `line_in::open` or `tone::ToneGenerator::new`.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub sample_rate: u32,
    pub topology: ChannelTopology,
    /// Input device name; `None` selects the host default.
    pub device: Option<String>,
    /// Samples delivered per read, normally the transform size.
    pub frame_len: usize,
    /// Slot layout the channel emits raw words in.
    pub format: SampleFormat,
}

/// A source of raw integer sample frames.
///
/// `read` blocks until a frame arrives or the timeout elapses, filling the
/// front of `frame` and returning the number of samples written. Timeouts
/// and transient backend errors are recoverable; `Disconnected` means no
/// further data will ever arrive.
pub trait CaptureChannel {
    fn enable(&mut self) -> Result<(), CaptureError>;
    fn read(&mut self, frame: &mut [i32], timeout: Duration) -> Result<usize, CaptureError>;
    fn disable(&mut self);

    /// Frames dropped because the consumer lagged behind the hardware.
    fn overruns(&self) -> u64 {
        0
    }
}
