//! cpal-backed line input.
//!
//! The audio backend owns the callback thread; the callback only packs
//! samples into raw slot words and pushes whole frames through a bounded
//! channel. The pipeline blocks on the channel with a timeout, which is the
//! only suspension point in the whole loop. When the pipeline lags, frames
//! are dropped at the channel boundary and counted, never buffered without
//! bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{CaptureChannel, CaptureError, ChannelConfig, ChannelTopology, SampleFormat};

/// Frames the channel may hold before the backend starts dropping.
const CHANNEL_DEPTH: usize = 4;

pub struct LineInput {
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    channels: usize,
    format: SampleFormat,
    frame_len: usize,
    topology: ChannelTopology,
    tx: Sender<Vec<i32>>,
    rx: Receiver<Vec<i32>>,
    overruns: Arc<AtomicU64>,
    input_stream: Option<cpal::Stream>,
    monitor_stream: Option<cpal::Stream>,
}

/// Resolves the channel description into a concrete cpal input.
///
/// Device and stream parameters are fixed here, once; the streams themselves
/// are not created until `enable`.
pub fn open(cfg: &ChannelConfig) -> Result<LineInput> {
    let host = cpal::default_host();
    let device = match &cfg.device {
        Some(name) => host
            .input_devices()
            .context("failed to enumerate input devices")?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device {:?} not found", name))?,
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device available"))?,
    };
    log::info!("Capture device: {}", device.name()?);

    let (stream_config, channels) = find_input_config(&device, cfg.sample_rate)?;
    if stream_config.sample_rate.0 != cfg.sample_rate {
        log::warn!(
            "Device cannot run at {} Hz, using {} Hz; the frequency axis will be scaled",
            cfg.sample_rate,
            stream_config.sample_rate.0
        );
    }
    log::info!(
        "Stream: {} Hz, {} channel(s), f32 samples, {:?} topology",
        stream_config.sample_rate.0,
        channels,
        cfg.topology
    );

    let (tx, rx) = bounded(CHANNEL_DEPTH);
    Ok(LineInput {
        device,
        stream_config,
        channels,
        format: cfg.format,
        frame_len: cfg.frame_len,
        topology: cfg.topology,
        tx,
        rx,
        overruns: Arc::new(AtomicU64::new(0)),
        input_stream: None,
        monitor_stream: None,
    })
}

/// Lists capture device names, for `--list-devices`.
pub fn device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("failed to enumerate input devices")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

fn find_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<(cpal::StreamConfig, usize)> {
    let mut candidates: Vec<_> = device
        .supported_input_configs()
        .context("failed to query input configurations")?
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .collect();
    if candidates.is_empty() {
        anyhow::bail!("no f32 input configuration available on this device");
    }

    // Prefer mono, then the config whose rate range is closest to the target.
    candidates.sort_by_key(|c| {
        let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
        let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
        (c.channels(), min_diff.min(max_diff))
    });
    let range = candidates.remove(0);
    let rate = target_rate.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    let supported = range.with_sample_rate(cpal::SampleRate(rate));
    let channels = supported.channels() as usize;
    Ok((supported.into(), channels))
}

impl CaptureChannel for LineInput {
    fn enable(&mut self) -> Result<(), CaptureError> {
        if self.input_stream.is_some() {
            return Ok(());
        }

        let tx = self.tx.clone();
        let overruns = Arc::clone(&self.overruns);
        let format = self.format;
        let full_scale = format.full_scale();
        let channels = self.channels;
        let frame_len = self.frame_len;
        let mut pending: Vec<i32> = Vec::with_capacity(frame_len * 2);

        let err_fn = |err| log::warn!("audio stream error: {err}");
        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Left slot only, matching the single-channel pipeline.
                    for slot in data.chunks(channels) {
                        let amplitude = slot[0].clamp(-1.0, 1.0) * full_scale;
                        pending.push(format.pack(amplitude));
                    }
                    while pending.len() >= frame_len {
                        let frame: Vec<i32> = pending.drain(..frame_len).collect();
                        if tx.try_send(frame).is_err() {
                            overruns.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        self.input_stream = Some(stream);

        if self.topology == ChannelTopology::Duplex {
            self.monitor_stream = Some(self.open_monitor()?);
        }
        Ok(())
    }

    fn read(&mut self, frame: &mut [i32], timeout: Duration) -> Result<usize, CaptureError> {
        if self.input_stream.is_none() {
            return Err(CaptureError::NotEnabled);
        }
        let chunk = match self.rx.recv_timeout(timeout) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => return Err(CaptureError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Disconnected),
        };
        let n = chunk.len().min(frame.len());
        frame[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn disable(&mut self) {
        self.input_stream = None;
        self.monitor_stream = None;
        log::debug!("capture channel disabled");
    }

    fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

impl LineInput {
    /// Duplex wiring keeps a silent playback stream on the capture device so
    /// both directions run off one clock, mirroring a shared-bus setup.
    fn open_monitor(&self) -> Result<cpal::Stream, CaptureError> {
        let err_fn = |err| log::warn!("monitor stream error: {err}");
        let config = self
            .device
            .default_output_config()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let stream = self
            .device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| data.fill(0.0),
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        Ok(stream)
    }
}
