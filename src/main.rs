mod capture;
mod cli;
mod config;
mod dsp;
mod pipeline;
mod render;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use capture::tone::ToneGenerator;
use capture::{line_in, CaptureChannel, ChannelConfig, ChannelTopology, SampleFormat};
use cli::{Cli, Source};
use pipeline::{PipelineConfig, SpectrumPipeline};
use render::view::SpectrumView;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect sonoscope.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("sonoscope.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("sonoscope").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("sonoscope").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut file_cfg = config::Config::default();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.sample_rate == 16_000 {
                cli.sample_rate = cfg.capture.sample_rate;
            }
            if cli.fft_size == 2048 {
                cli.fft_size = cfg.analysis.fft_size;
            }
            if cli.timeout_ms == 1000 {
                cli.timeout_ms = cfg.capture.timeout_ms;
            }
            if cli.delay_ms == 200 {
                cli.delay_ms = cfg.analysis.delay_ms;
            }
            if cli.tone_hz == 1000.0 {
                cli.tone_hz = cfg.analysis.tone_hz;
            }
            if cli.columns == 64 {
                cli.columns = cfg.display.columns;
            }
            if cli.rows == 10 {
                cli.rows = cfg.display.rows;
            }
            if cli.min_db == -120.0 {
                cli.min_db = cfg.display.min_db;
            }
            if cli.max_db == 40.0 {
                cli.max_db = cfg.display.max_db;
            }
            if cli.device.is_none() {
                cli.device = cfg.capture.device.clone();
            }
            if cli.topology == ChannelTopology::Simplex {
                cli.topology = cfg.capture.topology;
            }
            file_cfg = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    // List devices mode
    if cli.list_devices {
        println!("Available capture devices:");
        for name in line_in::device_names()? {
            println!("  {}", name);
        }
        return Ok(());
    }

    log::info!("sonoscope - live audio spectrum scope");
    log::info!("Source: {:?}", cli.source);
    log::info!("Transform: {} points @ {} Hz", cli.fft_size, cli.sample_rate);
    log::info!(
        "Display: {}x{} cells, {:.0}..{:.0} dB",
        cli.columns,
        cli.rows,
        cli.min_db,
        cli.max_db
    );

    // 1. Resolve the slot format and display grid
    let format = SampleFormat::new(
        file_cfg.capture.slot_bits,
        file_cfg.capture.sample_bits,
        file_cfg.capture.justification,
    )
    .context("invalid sample format configuration")?;
    let view = SpectrumView::new(
        cli.columns,
        cli.rows,
        cli.min_db,
        cli.max_db,
        file_cfg.display.marker,
    )
    .context("invalid display configuration")?;

    // 2. Build the processing pipeline (window table, twiddle tables, buffers)
    let mut spectrum = SpectrumPipeline::new(PipelineConfig {
        fft_size: cli.fft_size,
        max_fft_size: file_cfg.analysis.max_fft_size,
        sample_rate: cli.sample_rate,
        format,
        read_timeout: Duration::from_millis(cli.timeout_ms),
        frame_delay: Duration::from_millis(cli.delay_ms),
        max_frames: cli.frames,
    })
    .context("failed to build the processing pipeline")?;

    // 3. Open and enable the capture channel
    let channel_cfg = ChannelConfig {
        sample_rate: cli.sample_rate,
        topology: cli.topology,
        device: cli.device.clone(),
        frame_len: cli.fft_size,
        format,
    };
    let mut channel: Box<dyn CaptureChannel> = match cli.source {
        Source::LineIn => Box::new(
            line_in::open(&channel_cfg).context("failed to open the capture device")?,
        ),
        Source::Tone => {
            log::info!("Synthesizing a {:.0} Hz tone", cli.tone_hz);
            Box::new(ToneGenerator::new(&channel_cfg, cli.tone_hz))
        }
    };
    channel
        .enable()
        .context("failed to enable the capture channel")?;

    // 4. Run the capture loop
    let result = spectrum.run(channel.as_mut(), &view);
    channel.disable();
    result
}
