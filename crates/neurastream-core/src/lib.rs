//! Playback engine, noise stage, and session manager for a replayed BCI
//! recording.
//!
//! This crate has no network surface of its own; `neurastream-server`
//! drives it from an HTTP/WebSocket process, and `neurastream-lsl` taps its
//! packets for the optional side-channel publisher.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod models;
pub mod noise;
pub mod session;
pub mod stats;

pub use engine::{EmitOutcome, EngineState, EngineStats, PlaybackEngine};
pub use error::{CoreError, Result};
pub use models::{Intention, Kinematics, SpikeData, StreamMetadata, StreamPacket};
pub use noise::{NoiseConfig, NoiseStage};
pub use session::{ManagerStats, SessionInfo, SessionManager};
pub use stats::{StatsRing, StatsSummary};
