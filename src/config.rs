use serde::Deserialize;
use std::path::PathBuf;

use crate::capture::{ChannelTopology, Justification};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_topology")]
    pub topology: ChannelTopology,
    #[serde(default = "default_slot_bits")]
    pub slot_bits: u32,
    #[serde(default = "default_sample_bits")]
    pub sample_bits: u32,
    #[serde(default = "default_justification")]
    pub justification: Justification,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_max_fft_size")]
    pub max_fft_size: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_tone_hz")]
    pub tone_hz: f64,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    #[serde(default = "default_marker")]
    pub marker: char,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            device: None,
            topology: default_topology(),
            slot_bits: default_slot_bits(),
            sample_bits: default_sample_bits(),
            justification: default_justification(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            max_fft_size: default_max_fft_size(),
            delay_ms: default_delay_ms(),
            tone_hz: default_tone_hz(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            rows: default_rows(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            marker: default_marker(),
        }
    }
}

fn default_sample_rate() -> u32 { 16_000 }
fn default_topology() -> ChannelTopology { ChannelTopology::Simplex }
fn default_slot_bits() -> u32 { 32 }
fn default_sample_bits() -> u32 { 24 }
fn default_justification() -> Justification { Justification::Left }
fn default_timeout_ms() -> u64 { 1000 }
fn default_fft_size() -> usize { 2048 }
fn default_max_fft_size() -> usize { 4096 }
fn default_delay_ms() -> u64 { 200 }
fn default_tone_hz() -> f64 { 1000.0 }
fn default_columns() -> usize { 64 }
fn default_rows() -> usize { 10 }
fn default_min_db() -> f32 { -120.0 }
fn default_max_db() -> f32 { 40.0 }
fn default_marker() -> char { '|' }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}
