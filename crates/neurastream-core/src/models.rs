//! Wire-level packet and metadata types shared by the engine and the
//! streaming fan-out layer.

use serde::{Deserialize, Serialize};

/// Binned spike counts for every channel of a single packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeData {
    /// Channel identifiers, `[0..C)`, identical across every packet of a session
    pub channel_ids: Vec<u32>,
    /// Spike count per channel over the packet's bin
    pub spike_counts: Vec<i64>,
    /// Bin width in milliseconds, constant `25.0`
    pub bin_size_ms: f64,
}

/// Cursor kinematics ground truth at the packet's time bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Hand velocity, x component
    pub vx: f64,
    /// Hand velocity, y component
    pub vy: f64,
    /// Cursor position, x component
    pub x: f64,
    /// Cursor position, y component
    pub y: f64,
}

/// Reach-target intention ground truth.
///
/// Modeled as a tagged enum rather than an all-nullable struct: there is no
/// state in which `target_id` is present but `target_x`/`target_y` are
/// absent. Serializes to the spec's flat, all-nullable-field JSON shape via
/// a custom [`Serialize`] impl so wire clients see no difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intention {
    /// The packet falls within a trial with an active reach target
    Active {
        /// Index of the active target within the trial
        target_id: u32,
        /// Target x position
        target_x: f64,
        /// Target y position
        target_y: f64,
        /// Euclidean distance from the packet's cursor position to the target
        distance_to_target: f64,
    },
    /// The packet falls outside any trial
    None,
}

impl Intention {
    /// Build an active intention from a target position and the packet's
    /// current cursor position.
    pub fn active(target_id: u32, target: (f64, f64), cursor: (f64, f64)) -> Self {
        let dx = target.0 - cursor.0;
        let dy = target.1 - cursor.1;
        Self::Active {
            target_id,
            target_x: target.0,
            target_y: target.1,
            distance_to_target: (dx * dx + dy * dy).sqrt(),
        }
    }

    /// The active target's index, if any
    pub fn target_id(&self) -> Option<u32> {
        match self {
            Self::Active { target_id, .. } => Some(*target_id),
            Self::None => Option::None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IntentionWire {
    target_id: Option<u32>,
    target_x: Option<f64>,
    target_y: Option<f64>,
    distance_to_target: Option<f64>,
}

impl Serialize for Intention {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = match *self {
            Intention::Active {
                target_id,
                target_x,
                target_y,
                distance_to_target,
            } => IntentionWire {
                target_id: Some(target_id),
                target_x: Some(target_x),
                target_y: Some(target_y),
                distance_to_target: Some(distance_to_target),
            },
            Intention::None => IntentionWire {
                target_id: Option::None,
                target_x: Option::None,
                target_y: Option::None,
                distance_to_target: Option::None,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Intention {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = IntentionWire::deserialize(deserializer)?;
        Ok(match (wire.target_id, wire.target_x, wire.target_y) {
            (Some(target_id), Some(target_x), Some(target_y)) => Intention::Active {
                target_id,
                target_x,
                target_y,
                distance_to_target: wire.distance_to_target.unwrap_or(0.0),
            },
            _ => Intention::None,
        })
    }
}

/// Trial context attached to a packet whose bin falls inside a trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialContext {
    /// Enclosing trial's identifier
    pub trial_id: u32,
    /// Milliseconds elapsed since the enclosing trial's `t_start`
    pub trial_time_ms: f64,
}

/// The unit of wire output, emitted once per tick per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPacket {
    /// Wall-clock time the packet was generated, Unix seconds
    pub timestamp: f64,
    /// Monotonic, per-session, contiguous packet sequence number
    pub sequence_number: u64,
    /// Spike counts for all channels
    pub spikes: SpikeData,
    /// Cursor kinematics at this bin
    pub kinematics: Kinematics,
    /// Reach-target intention at this bin
    pub intention: Intention,
    /// Identifier of the trial enclosing this bin, `null` outside any trial
    pub trial_id: Option<u32>,
    /// Milliseconds since the enclosing trial's `t_start`, `null` outside any trial
    pub trial_time_ms: Option<f64>,
}

/// Metadata sent once, as the first frame of every streaming connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Dataset display name
    pub dataset: String,
    /// Total number of 25ms bins in the dataset
    pub total_packets: u64,
    /// Tick rate, constant 40
    pub frequency_hz: u32,
    /// Number of neural channels
    pub num_channels: u32,
    /// Total recording duration in seconds
    pub duration_seconds: f64,
    /// Number of trials in the dataset
    pub num_trials: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intention_none_serializes_to_all_null() {
        let json = serde_json::to_value(Intention::None).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "target_id": null, "target_x": null, "target_y": null,
                "distance_to_target": null
            })
        );
    }

    #[test]
    fn test_intention_active_distance() {
        let intention = Intention::active(2, (3.0, 4.0), (0.0, 0.0));
        match intention {
            Intention::Active {
                distance_to_target, ..
            } => assert!((distance_to_target - 5.0).abs() < 1e-9),
            Intention::None => panic!("expected Active"),
        }
    }

    #[test]
    fn test_packet_without_trial_flattens_no_trial_fields() {
        let packet = StreamPacket {
            timestamp: 0.0,
            sequence_number: 0,
            spikes: SpikeData {
                channel_ids: vec![0],
                spike_counts: vec![0],
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
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json.get("trial_id"), Some(&serde_json::Value::Null));
    }
}
