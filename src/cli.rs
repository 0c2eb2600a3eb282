use clap::Parser;
use std::path::PathBuf;

use crate::capture::ChannelTopology;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Capture from an audio input device.
    LineIn,
    /// Synthesize a sine tone instead of touching hardware.
    Tone,
}

#[derive(Parser, Debug)]
#[command(name = "sonoscope", about = "Live audio spectrum scope for the terminal")]
pub struct Cli {
    /// Capture source
    #[arg(short, long, value_enum, default_value_t = Source::LineIn)]
    pub source: Source,

    /// Config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Capture device name (see --list-devices)
    #[arg(long)]
    pub device: Option<String>,

    /// Channel topology (hardware wiring only)
    #[arg(long, value_enum, default_value_t = ChannelTopology::Simplex)]
    pub topology: ChannelTopology,

    /// Transform size in samples (power of two)
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,

    /// Capture sample rate in Hz
    #[arg(long, default_value_t = 16000)]
    pub sample_rate: u32,

    /// Frequency of the synthetic tone source in Hz
    #[arg(long, default_value_t = 1000.0)]
    pub tone_hz: f64,

    /// Blocking read timeout in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Delay between rendered frames in milliseconds
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,

    /// Display grid width in columns
    #[arg(long, default_value_t = 64)]
    pub columns: usize,

    /// Display grid height in rows
    #[arg(long, default_value_t = 10)]
    pub rows: usize,

    /// Bottom of the displayed range in dB
    #[arg(long, default_value_t = -120.0, allow_hyphen_values = true)]
    pub min_db: f32,

    /// Top of the displayed range in dB
    #[arg(long, default_value_t = 40.0, allow_hyphen_values = true)]
    pub max_db: f32,

    /// Stop after this many rendered frames (0 = run until interrupted)
    #[arg(long, default_value_t = 0)]
    pub frames: u64,

    /// List capture devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
