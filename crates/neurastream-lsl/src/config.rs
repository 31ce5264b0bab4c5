//! Side-channel publisher configuration

/// Parameters for the optional LSL outlet, sourced from `LSL_*` environment
/// variables by `neurastream-server`'s configuration loader.
#[derive(Debug, Clone)]
pub struct LslConfig {
    /// Outlet display name
    pub stream_name: String,
    /// LSL content type used by discovery filters, e.g. `"EEG"`
    pub stream_type: String,
    /// Unique source identifier distinguishing this outlet from others on
    /// the same network
    pub source_id: String,
    /// Number of channels the outlet carries, matching the dataset
    pub num_channels: u32,
}

impl Default for LslConfig {
    fn default() -> Self {
        Self {
            stream_name: "neurastream".to_string(),
            stream_type: "EEG".to_string(),
            source_id: "neurastream-replay".to_string(),
            num_channels: 0,
        }
    }
}
