//! Optional per-packet spike perturbation: Gaussian noise plus a slow,
//! per-channel sinusoidal drift, simulating realistic recording-rig decay.

use std::f64::consts::PI;

use rand_distr::{Distribution, Normal, Uniform};

use crate::models::StreamPacket;

/// Configuration for the noise stage; all parameters are non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseConfig {
    /// Standard deviation of the additive Gaussian noise
    pub noise_std: f64,
    /// Amplitude of the sinusoidal drift, as a fraction of the spike count
    pub drift_amplitude: f64,
    /// Period of the drift sinusoid, in seconds
    pub drift_period_s: f64,
    /// Whether Gaussian noise is applied
    pub noise_enabled: bool,
    /// Whether sinusoidal drift is applied
    pub drift_enabled: bool,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            noise_std: 0.5,
            drift_amplitude: 0.2,
            drift_period_s: 60.0,
            noise_enabled: false,
            drift_enabled: false,
        }
    }
}

/// Stateful transformer applied to every packet when installed on an engine.
///
/// Draws a per-channel phase offset on the first call after construction or
/// [`reset`](NoiseStage::reset); every subsequent call reuses it until the
/// next reset.
pub struct NoiseStage {
    config: NoiseConfig,
    phase: Option<Vec<f64>>,
}

impl NoiseStage {
    /// Build a noise stage from its configuration
    pub fn new(config: NoiseConfig) -> Self {
        Self {
            config,
            phase: None,
        }
    }

    /// Clear the per-channel phase vector; the next [`apply`](Self::apply)
    /// call re-initializes it from a fresh uniform draw.
    pub fn reset(&mut self) {
        self.phase = None;
    }

    fn phase_for(&mut self, channels: usize) -> &[f64] {
        if self.phase.as_ref().map(Vec::len) != Some(channels) {
            let dist = Uniform::new(0.0, 2.0 * PI);
            let mut rng = rand::thread_rng();
            self.phase = Some((0..channels).map(|_| dist.sample(&mut rng)).collect());
        }
        self.phase.as_ref().unwrap()
    }

    /// Produce a perturbed copy of `packet`. `elapsed_s` is the playback
    /// time of the packet's bin, `i * 0.025`, used as the drift sinusoid's
    /// phase input.
    pub fn apply(&mut self, packet: &StreamPacket, elapsed_s: f64) -> StreamPacket {
        let channels = packet.spikes.spike_counts.len();
        let mut rng = rand::thread_rng();
        let normal = Normal::new(0.0, self.config.noise_std.max(f64::EPSILON)).unwrap();

        let phase = if self.config.drift_enabled {
            self.phase_for(channels).to_vec()
        } else {
            Vec::new()
        };

        let mut perturbed = packet.clone();
        for (c, count) in perturbed.spikes.spike_counts.iter_mut().enumerate() {
            let mut value = *count as f64;

            if self.config.drift_enabled {
                let phi = phase.get(c).copied().unwrap_or(0.0);
                let drift = self.config.drift_amplitude
                    * (2.0 * PI * elapsed_s / self.config.drift_period_s + phi).sin();
                value *= 1.0 + drift;
            }

            if self.config.noise_enabled {
                value += normal.sample(&mut rng);
            }

            *count = value.round().max(0.0) as i64;
        }

        perturbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Intention, Kinematics, SpikeData};

    fn toy_packet(counts: Vec<i64>) -> StreamPacket {
        let n = counts.len();
        StreamPacket {
            timestamp: 0.0,
            sequence_number: 0,
            spikes: SpikeData {
                channel_ids: (0..n as u32).collect(),
                spike_counts: counts,
                bin_size_ms: 25.0,
            },
            kinematics: Kinematics {
                vx: 0.0,
                vy: 0.0,
                x: 0.0,
                y: 0.0,
            },
            intention: Intention::None,
            trial_id: None,
            trial_time_ms: None,
        }
    }

    #[test]
    fn test_disabled_stage_is_identity() {
        let mut stage = NoiseStage::new(NoiseConfig {
            noise_enabled: false,
            drift_enabled: false,
            ..NoiseConfig::default()
        });
        let packet = toy_packet(vec![3, 5, 0]);
        let out = stage.apply(&packet, 1.0);
        assert_eq!(out.spikes.spike_counts, vec![3, 5, 0]);
    }

    #[test]
    fn test_counts_never_go_negative() {
        let mut stage = NoiseStage::new(NoiseConfig {
            noise_std: 50.0,
            noise_enabled: true,
            drift_enabled: false,
            ..NoiseConfig::default()
        });
        let packet = toy_packet(vec![0, 0, 0]);
        for _ in 0..50 {
            let out = stage.apply(&packet, 0.0);
            assert!(out.spikes.spike_counts.iter().all(|&c| c >= 0));
        }
    }

    #[test]
    fn test_reset_allows_phase_to_change() {
        let mut stage = NoiseStage::new(NoiseConfig {
            drift_enabled: true,
            drift_amplitude: 1.0,
            drift_period_s: 10.0,
            ..NoiseConfig::default()
        });
        let packet = toy_packet(vec![100]);
        let _ = stage.apply(&packet, 0.0);
        let phase_before = stage.phase.clone();
        stage.reset();
        assert!(stage.phase.is_none());
        let _ = stage.apply(&packet, 0.0);
        assert!(stage.phase.is_some());
        // phases are redrawn independently; equality isn't guaranteed either
        // way, but the vector must exist again after a fresh draw.
        let _ = phase_before;
    }

    #[test]
    fn test_other_fields_preserved() {
        let mut stage = NoiseStage::new(NoiseConfig::default());
        let packet = toy_packet(vec![1, 2]);
        let out = stage.apply(&packet, 0.0);
        assert_eq!(out.sequence_number, packet.sequence_number);
        assert_eq!(out.kinematics, packet.kinematics);
        assert_eq!(out.spikes.channel_ids, packet.spikes.channel_ids);
    }
}
