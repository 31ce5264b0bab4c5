//! Core trait and type definitions for the dataset layer
//!
//! A `Dataset` is a single logical recording of duration `D` seconds over `C`
//! neural channels. Implementations must be safe to query from many
//! concurrent callers (§4.1): all reads are side-effect free.

use crate::ids::{ChannelId, TargetId, TrialId};

/// One behavioral epoch `[t_start, t_stop)` with a designated reach target.
///
/// Invariants upheld by every `Dataset` implementation: `t_start < t_stop`,
/// `0 <= active_target < num_targets`, and trials are non-overlapping and
/// sorted by `t_start`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// Identifier, stable for the lifetime of the dataset
    pub id: TrialId,
    /// Start time in seconds since recording start
    pub t_start: f64,
    /// Stop time in seconds since recording start (exclusive)
    pub t_stop: f64,
    /// Whether the subject completed the reach successfully
    pub success: bool,
    /// Number of candidate targets presented this trial
    pub num_targets: u32,
    /// Which of the `num_targets` candidates was the active reach target
    pub active_target: TargetId,
    /// Position (x, y) of each candidate target, length `num_targets`
    pub target_positions: Vec<(f64, f64)>,
}

impl Trial {
    /// Whether `t` falls within this trial, half-open on the stop bound
    pub fn contains(&self, t: f64) -> bool {
        t >= self.t_start && t < self.t_stop
    }

    /// Position of the trial's active target, if the index is in range
    pub fn active_target_position(&self) -> Option<(f64, f64)> {
        self.target_positions
            .get(self.active_target.raw() as usize)
            .copied()
    }
}

/// Binned spike counts over a `[t0, t1)` window, `bins x channels`.
///
/// `B = max(1, floor((t1 - t0) / (bin_ms / 1000)))` per §4.1.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeMatrix {
    bins: usize,
    channels: usize,
    counts: Vec<u32>,
}

impl SpikeMatrix {
    /// Build a matrix from a flat, row-major `bins x channels` buffer
    pub fn from_flat(bins: usize, channels: usize, counts: Vec<u32>) -> Self {
        debug_assert_eq!(counts.len(), bins * channels);
        Self {
            bins,
            channels,
            counts,
        }
    }

    /// Allocate an all-zero matrix, used for out-of-range windows (§4.1)
    pub fn zeros(bins: usize, channels: usize) -> Self {
        Self::from_flat(bins, channels, vec![0; bins * channels])
    }

    /// Number of time bins
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Spike counts for bin `i`, one entry per channel
    pub fn row(&self, i: usize) -> &[u32] {
        let start = i * self.channels;
        &self.counts[start..start + self.channels]
    }

    /// Mutable spike counts for bin `i`
    pub fn row_mut(&mut self, i: usize) -> &mut [u32] {
        let start = i * self.channels;
        &mut self.counts[start..start + self.channels]
    }
}

/// Cursor position and hand velocity samples over a queried window.
///
/// All four arrays share the same length and sample index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Kinematics {
    /// Hand velocity, x component
    pub vx: Vec<f64>,
    /// Hand velocity, y component
    pub vy: Vec<f64>,
    /// Cursor position, x component
    pub x: Vec<f64>,
    /// Cursor position, y component
    pub y: Vec<f64>,
}

impl Kinematics {
    /// Number of samples in this window
    pub fn len(&self) -> usize {
        self.vx.len()
    }

    /// Whether the window yielded no samples (valid at recording edges)
    pub fn is_empty(&self) -> bool {
        self.vx.is_empty()
    }

    /// An all-zero single sample, used when a query falls outside the
    /// recorded behavior range (§4.3 "Failure semantics")
    pub fn zeroed_sample() -> Self {
        Self {
            vx: vec![0.0],
            vy: vec![0.0],
            x: vec![0.0],
            y: vec![0.0],
        }
    }
}

/// Read-only, random-access query surface over a recorded BCI session.
///
/// The dataset is opened once at process start and shared by every session
/// for the process lifetime (§3 "Ownership"). Implementations must tolerate
/// concurrent calls from many playback engines at once.
pub trait Dataset: Send + Sync {
    /// Number of neural channels, `C`
    fn num_channels(&self) -> u32;

    /// Total recording duration in seconds, `D`
    fn duration_seconds(&self) -> f64;

    /// Behavior sample rate detected from the file, `f_b`
    fn behavior_rate(&self) -> f64;

    /// Binned spike counts in `[t0, t1)`, `bin_ms` wide bins.
    ///
    /// Out-of-range windows (negative, or entirely past `duration_seconds`)
    /// return all-zero bins rather than erroring (§4.1).
    fn binned_spikes(&self, t0: f64, t1: f64, bin_ms: f64) -> SpikeMatrix;

    /// Cursor kinematics samples in `[t0, t1)`.
    fn kinematics(&self, t0: f64, t1: f64) -> Kinematics;

    /// All trials, ordered by `t_start`
    fn trial_list(&self) -> &[Trial];

    /// The trial containing `t`, half-open on the stop bound, or `None`
    fn trial_at(&self, t: f64) -> Option<&Trial>;

    /// All trials whose active target is `target`
    fn trials_for_target(&self, target: TargetId) -> Vec<&Trial>;

    /// Position of a trial's active target
    fn target_position(&self, trial: &Trial) -> Option<(f64, f64)> {
        trial.active_target_position()
    }

    /// A single trial by id, or `None`
    fn trial(&self, id: TrialId) -> Option<&Trial> {
        self.trial_list().iter().find(|t| t.id == id)
    }
}

/// Shared channel identifiers for a dataset, `[0, C)` in order.
///
/// `StreamPacket`s carry this unchanged across every packet of a session
/// (§3 "Channel count constancy").
pub fn channel_ids(num_channels: u32) -> Vec<ChannelId> {
    (0..num_channels).map(ChannelId::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_matrix_row_access() {
        let m = SpikeMatrix::from_flat(2, 3, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(m.row(0), &[1, 2, 3]);
        assert_eq!(m.row(1), &[4, 5, 6]);
    }

    #[test]
    fn test_spike_matrix_zeros() {
        let m = SpikeMatrix::zeros(1, 4);
        assert_eq!(m.row(0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_trial_contains_half_open() {
        let trial = Trial {
            id: TrialId::new(0),
            t_start: 1.0,
            t_stop: 2.0,
            success: true,
            num_targets: 2,
            active_target: TargetId::new(0),
            target_positions: vec![(1.0, 0.0), (0.0, 1.0)],
        };
        assert!(!trial.contains(0.999));
        assert!(trial.contains(1.0));
        assert!(trial.contains(1.999));
        assert!(!trial.contains(2.0));
        assert_eq!(trial.active_target_position(), Some((1.0, 0.0)));
    }

    #[test]
    fn test_channel_ids() {
        let ids = channel_ids(3);
        assert_eq!(ids, vec![ChannelId::new(0), ChannelId::new(1), ChannelId::new(2)]);
    }
}
