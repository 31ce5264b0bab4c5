//! Read-only dataset contract for recorded BCI sessions.
//!
//! This crate defines the [`Dataset`] trait — the query surface every
//! playback engine replays against — plus two implementations: an
//! in-memory [`MemoryDataset`] for tests and programmatic construction, and
//! a memory-mapped [`BinaryDataset`] that reads the crate's own `.nsds`
//! container format (see [`schemas`]).
//!
//! The real deployment target, an NWB/HDF5 recording, is out of scope here;
//! a loader that converts one into an `.nsds` file or a direct `Dataset`
//! impl is an external concern (§4.1, §6.3 of the originating
//! specification).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod file;
pub mod ids;
pub mod memory;
pub mod schemas;
pub mod traits;

pub use error::{DatasetError, Result};
pub use file::BinaryDataset;
pub use ids::{ChannelId, TargetId, TrialId};
pub use memory::{BehaviorTrace, MemoryDataset, SpikeTrains};
pub use traits::{channel_ids, Dataset, Kinematics, SpikeMatrix, Trial};
