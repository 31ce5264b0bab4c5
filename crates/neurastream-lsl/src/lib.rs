//! Optional Lab Streaming Layer side-channel publisher.
//!
//! The core treats this crate as fire-and-forget (§6.4 of the originating
//! design): absence, initialization failure, and per-call failures must
//! never disturb the primary stream. Build without the `lsl` feature (the
//! default) to get [`NullPublisher`] everywhere, with no native `liblsl`
//! dependency at all.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;

#[cfg(feature = "lsl")]
mod outlet;

use std::sync::Arc;

use neurastream_core::StreamPacket;

pub use config::LslConfig;
pub use error::{LslError, Result};

/// A fire-and-forget sink for replayed packets.
///
/// Implementations must never block the caller and must tolerate every
/// failure internally; there is no error return because the fan-out layer
/// treats every outcome identically — published, or silently dropped.
pub trait SidePublisher: Send + Sync {
    /// Attempt to publish one packet for `session_code`. Returns `true` if
    /// the packet was handed off, `false` if it was dropped (no sink
    /// installed, or the internal channel is full).
    fn try_publish(&self, session_code: &str, packet: &StreamPacket) -> bool;
}

/// The default sink when no side channel is configured; every call is a
/// no-op that reports success, since there is nothing to drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl SidePublisher for NullPublisher {
    fn try_publish(&self, _session_code: &str, _packet: &StreamPacket) -> bool {
        true
    }
}

#[cfg(feature = "lsl")]
/// Publishes each packet's spike counts onto an LSL outlet.
pub struct LslPublisher {
    worker: outlet::LslOutletWorker,
}

#[cfg(feature = "lsl")]
impl LslPublisher {
    /// Start the outlet's background worker thread.
    pub fn start(config: LslConfig) -> Result<Self> {
        let worker = outlet::LslOutletWorker::spawn(config)?;
        Ok(Self { worker })
    }
}

#[cfg(feature = "lsl")]
impl SidePublisher for LslPublisher {
    fn try_publish(&self, _session_code: &str, packet: &StreamPacket) -> bool {
        let sample: Vec<f32> = packet
            .spikes
            .spike_counts
            .iter()
            .map(|&c| c as f32)
            .collect();
        self.worker.try_push(sample)
    }
}

/// Build the configured publisher, falling back to [`NullPublisher`] when
/// LSL is disabled, unavailable in this build, or fails to start.
pub fn build_publisher(enabled: bool, config: LslConfig) -> Arc<dyn SidePublisher> {
    if !enabled {
        return Arc::new(NullPublisher);
    }

    #[cfg(feature = "lsl")]
    {
        match LslPublisher::start(config) {
            Ok(publisher) => return Arc::new(publisher),
            Err(err) => {
                log::warn!("LSL publisher failed to start, falling back to null sink: {err}");
                return Arc::new(NullPublisher);
            }
        }
    }

    #[cfg(not(feature = "lsl"))]
    {
        let _ = config;
        log::warn!("LSL_ENABLED is set but this build was compiled without the `lsl` feature");
        Arc::new(NullPublisher)
    }
}
