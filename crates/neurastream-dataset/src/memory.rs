//! In-memory `Dataset` implementation
//!
//! `MemoryDataset` owns every array outright; it is the representation
//! `BinaryDataset` parses `.nsds` files into, and is also convenient to
//! build directly in tests or from a future non-binary loader.

use crate::ids::{ChannelId, TargetId, TrialId};
use crate::traits::{Dataset, Kinematics, SpikeMatrix, Trial};

/// Per-channel spike times, in seconds since recording start, each sorted ascending
#[derive(Debug, Clone, Default)]
pub struct SpikeTrains {
    per_channel: Vec<Vec<f64>>,
}

impl SpikeTrains {
    /// Build from one sorted spike-time vector per channel
    pub fn new(per_channel: Vec<Vec<f64>>) -> Self {
        Self { per_channel }
    }

    /// Number of channels
    pub fn num_channels(&self) -> usize {
        self.per_channel.len()
    }

    fn spikes_in(&self, channel: usize, t0: f64, t1: f64) -> u32 {
        let times = &self.per_channel[channel];
        let start = times.partition_point(|&t| t < t0);
        let end = times.partition_point(|&t| t < t1);
        (end - start) as u32
    }
}

/// Behavior samples at a fixed rate, one timestamp per sample
#[derive(Debug, Clone, Default)]
pub struct BehaviorTrace {
    /// Sample timestamps, seconds since recording start, sorted ascending
    pub t: Vec<f64>,
    /// Cursor position, x component
    pub x: Vec<f64>,
    /// Cursor position, y component
    pub y: Vec<f64>,
    /// Hand velocity, x component
    pub vx: Vec<f64>,
    /// Hand velocity, y component
    pub vy: Vec<f64>,
}

impl BehaviorTrace {
    fn slice_range(&self, t0: f64, t1: f64) -> (usize, usize) {
        let start = self.t.partition_point(|&t| t < t0);
        let end = self.t.partition_point(|&t| t < t1);
        (start, end)
    }
}

/// A fully materialized, in-memory recorded session
#[derive(Debug, Clone)]
pub struct MemoryDataset {
    num_channels: u32,
    duration_seconds: f64,
    behavior_rate: f64,
    spikes: SpikeTrains,
    behavior: BehaviorTrace,
    trials: Vec<Trial>,
}

impl MemoryDataset {
    /// Assemble a dataset from its component parts.
    ///
    /// `trials` must already be sorted by `t_start`; callers (the `.nsds`
    /// parser, or tests) are expected to uphold this rather than pay for a
    /// sort on every open.
    pub fn new(
        num_channels: u32,
        duration_seconds: f64,
        behavior_rate: f64,
        spikes: SpikeTrains,
        behavior: BehaviorTrace,
        trials: Vec<Trial>,
    ) -> Self {
        Self {
            num_channels,
            duration_seconds,
            behavior_rate,
            spikes,
            behavior,
            trials,
        }
    }
}

impl Dataset for MemoryDataset {
    fn num_channels(&self) -> u32 {
        self.num_channels
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn behavior_rate(&self) -> f64 {
        self.behavior_rate
    }

    fn binned_spikes(&self, t0: f64, t1: f64, bin_ms: f64) -> SpikeMatrix {
        let channels = self.num_channels as usize;
        if t1 <= t0 || t0 >= self.duration_seconds || t1 <= 0.0 {
            return SpikeMatrix::zeros(1, channels);
        }
        let bin_s = bin_ms / 1000.0;
        let bins = ((t1 - t0) / bin_s).floor().max(1.0) as usize;
        let mut matrix = SpikeMatrix::zeros(bins, channels);
        for bin in 0..bins {
            let bin_start = t0 + bin as f64 * bin_s;
            let bin_end = bin_start + bin_s;
            let row = matrix.row_mut(bin);
            for channel in 0..channels {
                row[channel] = self.spikes.spikes_in(channel, bin_start, bin_end);
            }
        }
        matrix
    }

    fn kinematics(&self, t0: f64, t1: f64) -> Kinematics {
        if t1 <= t0 || t0 >= self.duration_seconds || t1 <= 0.0 {
            return Kinematics::zeroed_sample();
        }
        let (start, end) = self.behavior.slice_range(t0, t1);
        if start >= end {
            return Kinematics::zeroed_sample();
        }
        Kinematics {
            vx: self.behavior.vx[start..end].to_vec(),
            vy: self.behavior.vy[start..end].to_vec(),
            x: self.behavior.x[start..end].to_vec(),
            y: self.behavior.y[start..end].to_vec(),
        }
    }

    fn trial_list(&self) -> &[Trial] {
        &self.trials
    }

    fn trial_at(&self, t: f64) -> Option<&Trial> {
        self.trials.iter().find(|trial| trial.contains(t))
    }

    fn trials_for_target(&self, target: TargetId) -> Vec<&Trial> {
        self.trials
            .iter()
            .filter(|trial| trial.active_target == target)
            .collect()
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}
#[allow(dead_code)]
fn _assert_memory_dataset_send_sync() {
    assert_send_sync::<MemoryDataset>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ChannelId;

    fn toy_dataset() -> MemoryDataset {
        let spikes = SpikeTrains::new(vec![
            vec![0.01, 0.05, 0.12, 0.30],
            vec![0.02, 0.04],
        ]);
        let behavior = BehaviorTrace {
            t: vec![0.0, 0.1, 0.2, 0.3, 0.4],
            x: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            y: vec![0.0, -1.0, -2.0, -3.0, -4.0],
            vx: vec![0.0, 10.0, 10.0, 10.0, 10.0],
            vy: vec![0.0, -10.0, -10.0, -10.0, -10.0],
        };
        let trials = vec![Trial {
            id: TrialId::new(0),
            t_start: 0.0,
            t_stop: 0.4,
            success: true,
            num_targets: 2,
            active_target: TargetId::new(1),
            target_positions: vec![(1.0, 0.0), (0.0, 1.0)],
        }];
        MemoryDataset::new(2, 0.5, 10.0, spikes, behavior, trials)
    }

    #[test]
    fn test_binned_spikes_counts_in_window() {
        let ds = toy_dataset();
        let m = ds.binned_spikes(0.0, 0.1, 100.0);
        assert_eq!(m.bins(), 1);
        assert_eq!(m.row(0), &[2, 1]);
    }

    #[test]
    fn test_binned_spikes_out_of_range_is_zero() {
        let ds = toy_dataset();
        let m = ds.binned_spikes(10.0, 10.1, 25.0);
        assert_eq!(m.row(0), &[0, 0]);
    }

    #[test]
    fn test_kinematics_window() {
        let ds = toy_dataset();
        let k = ds.kinematics(0.1, 0.3);
        assert_eq!(k.x, vec![1.0, 2.0]);
        assert_eq!(k.len(), 2);
    }

    #[test]
    fn test_kinematics_out_of_range_returns_zeroed_sample() {
        let ds = toy_dataset();
        let k = ds.kinematics(5.0, 5.1);
        assert_eq!(k.x, vec![0.0]);
    }

    #[test]
    fn test_trial_at_and_target_lookup() {
        let ds = toy_dataset();
        assert!(ds.trial_at(0.2).is_some());
        assert!(ds.trial_at(1.0).is_none());
        assert_eq!(ds.trials_for_target(TargetId::new(1)).len(), 1);
        assert_eq!(ds.trials_for_target(TargetId::new(0)).len(), 0);
    }

    #[test]
    fn test_channel_id_not_used_directly_but_constructible() {
        let _ = ChannelId::new(0);
    }
}
