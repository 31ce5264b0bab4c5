//! Shared application state handed to every Axum handler

use std::sync::Arc;
use std::time::Instant;

use neurastream_core::{NoiseConfig, SessionManager};
use neurastream_dataset::Dataset;
use neurastream_lsl::SidePublisher;

use crate::config::Settings;

/// Everything a request handler needs, cloned cheaply via `Arc` fields.
#[derive(Clone)]
pub struct AppState {
    /// Shared, read-only dataset handle
    pub dataset: Arc<dyn Dataset>,
    /// Multi-session manager
    pub sessions: Arc<SessionManager>,
    /// Side-channel publisher, possibly a no-op
    pub side_publisher: Arc<dyn SidePublisher>,
    /// Loaded process settings
    pub settings: Arc<Settings>,
    /// Noise stage configuration applied to newly created sessions
    pub noise_config: Option<NoiseConfig>,
    /// Process start time, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Dataset display name shown in the metadata frame
    pub fn dataset_display_name(&self) -> String {
        self.settings.dataset_name.clone()
    }
}
