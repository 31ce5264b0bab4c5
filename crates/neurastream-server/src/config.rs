//! Environment-variable driven configuration (§6.5)

use serde::Deserialize;

use crate::error::{ApiError, Result};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_stream_frequency_hz() -> u32 {
    40
}

fn default_data_dir() -> String {
    "data/raw".to_string()
}

fn default_dataset_name() -> String {
    "mc_maze".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_noise_std() -> f64 {
    0.5
}

fn default_drift_amplitude() -> f64 {
    0.2
}

fn default_drift_period_seconds() -> f64 {
    60.0
}

fn default_lsl_stream_name() -> String {
    "neurastream".to_string()
}

fn default_lsl_stream_type() -> String {
    "EEG".to_string()
}

fn default_lsl_source_id() -> String {
    "neurastream-replay".to_string()
}

/// Process-wide settings, loaded once at startup from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Tick rate, derives the packet interval
    #[serde(default = "default_stream_frequency_hz")]
    pub stream_frequency_hz: u32,
    /// Directory containing dataset files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Dataset file stem, resolved to `{data_dir}/{dataset_name}.nsds`
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    /// Soft session capacity
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Session idle timeout, in seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl: u64,

    /// Whether the noise stage is installed on new sessions
    #[serde(default)]
    pub noise_injection_enabled: bool,
    /// Noise stage standard deviation
    #[serde(default = "default_noise_std")]
    pub noise_std: f64,
    /// Noise stage drift amplitude
    #[serde(default = "default_drift_amplitude")]
    pub drift_amplitude: f64,
    /// Noise stage drift period, in seconds
    #[serde(default = "default_drift_period_seconds")]
    pub drift_period_seconds: f64,

    /// Whether the LSL side channel is enabled
    #[serde(default)]
    pub lsl_enabled: bool,
    /// LSL outlet display name
    #[serde(default = "default_lsl_stream_name")]
    pub lsl_stream_name: String,
    /// LSL outlet content type
    #[serde(default = "default_lsl_stream_type")]
    pub lsl_stream_type: String,
    /// LSL outlet source identifier
    #[serde(default = "default_lsl_source_id")]
    pub lsl_source_id: String,
}

impl Settings {
    /// Load settings from the process environment, applying defaults for
    /// any unset key.
    pub fn load() -> Result<Self> {
        envy::from_env::<Settings>().map_err(|err| ApiError::config(err.to_string()))
    }

    /// Resolved path to the dataset file.
    pub fn dataset_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join(format!("{}.nsds", self.dataset_name))
    }

    /// Packet interval derived from the tick rate, in milliseconds.
    pub fn packet_interval_ms(&self) -> f64 {
        1000.0 / self.stream_frequency_hz as f64
    }
}
