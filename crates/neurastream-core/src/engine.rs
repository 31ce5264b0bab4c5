//! The tick-accurate, 40Hz playback engine.
//!
//! One instance per session. Owns the cursor, sequence counter, pause/run
//! flags, per-session filters, and timing statistics; pulls time-aligned
//! slices from a shared [`Dataset`](neurastream_dataset::Dataset) and emits
//! one [`StreamPacket`] per tick.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use neurastream_dataset::Dataset;

use crate::models::{Intention, Kinematics, SpikeData, StreamPacket};
use crate::noise::NoiseStage;
use crate::stats::{StatsRing, StatsSummary};

/// Tick rate the engine is specified against, 40 Hz.
pub const TICK_HZ: u32 = 40;
/// Tick interval in seconds, `1/40`.
pub const TICK_INTERVAL_S: f64 = 1.0 / TICK_HZ as f64;
/// Bin width in milliseconds, the wire-visible constant `25.0`.
pub const BIN_SIZE_MS: f64 = TICK_INTERVAL_S * 1000.0;

/// Result of one call to [`PlaybackEngine::tick`].
pub enum EmitOutcome {
    /// A packet was produced and is ready to send
    Emitted(StreamPacket),
    /// The active filters skipped every remaining bin before the next match
    /// could be found and end-of-stream was reached while searching
    Dropped,
    /// The cursor has reached the end of the dataset
    EndOfStream,
    /// The engine is paused; callers should wait briefly and tick again
    /// rather than busy-poll. `tick` never blocks indefinitely on this
    /// state itself so a caller holding the engine's lock can still observe
    /// a concurrent `resume`/`stop` between attempts.
    Paused,
}

/// Lifecycle state of a playback engine: `Fresh → Running ⇄ Paused → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed but never ticked
    Fresh,
    /// Actively advancing and emitting
    Running,
    /// Ticking suspended; cursor and counters frozen
    Paused,
    /// Terminated; the session is now eligible for eviction
    Stopped,
}

/// Point-in-time snapshot of one engine's counters, used to build the
/// `/metrics` and `/api/sessions/{code}` responses.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Packets successfully emitted
    pub packets_sent: u64,
    /// Packets lost to a `SendError` or a `DatasetReadError`, never to a
    /// plain filter mismatch (see [`PlaybackEngine::record_dropped`])
    pub dropped_packets: u64,
    /// Current bin index
    pub cursor: u64,
    /// Whether the engine is in the `Running` state
    pub is_running: bool,
    /// Whether the engine is in the `Paused` state
    pub is_paused: bool,
    /// Timing error statistics over the last 1000 emitted packets
    pub timing_error_ms: Option<StatsSummary>,
    /// Network latency statistics, as recorded by the fan-out layer
    pub network_latency_ms: Option<StatsSummary>,
}

/// Per-session playback state and control surface.
pub struct PlaybackEngine {
    dataset: Arc<dyn Dataset>,
    num_bins: u64,
    cursor: u64,
    sequence: u64,
    state: EngineState,
    start_time: Option<Instant>,
    trial_filter: Option<u32>,
    target_filter: Option<u32>,
    noise: Option<NoiseStage>,
    packets_sent: u64,
    dropped_packets: u64,
    timing_error_ms: StatsRing,
    network_latency_ms: StatsRing,
}

impl PlaybackEngine {
    /// Build a fresh engine over a shared dataset handle.
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        let num_bins = (dataset.duration_seconds() * TICK_HZ as f64).floor() as u64;
        Self {
            dataset,
            num_bins,
            cursor: 0,
            sequence: 0,
            state: EngineState::Fresh,
            start_time: None,
            trial_filter: None,
            target_filter: None,
            noise: None,
            packets_sent: 0,
            dropped_packets: 0,
            timing_error_ms: StatsRing::default(),
            network_latency_ms: StatsRing::default(),
        }
    }

    /// Install a noise stage, replacing any previous one.
    pub fn set_noise(&mut self, noise: NoiseStage) {
        self.noise = Some(noise);
    }

    /// Restrict emission to bins belonging to `trial_id` and/or whose active
    /// target is `target_id`.
    pub fn set_filters(&mut self, trial_id: Option<u32>, target_id: Option<u32>) {
        self.trial_filter = trial_id;
        self.target_filter = target_id;
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Current bin index
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Total number of bins in the underlying dataset
    pub fn num_bins(&self) -> u64 {
        self.num_bins
    }

    /// Pause the tick loop; a no-op if already paused or stopped.
    pub fn pause(&mut self) {
        if self.state == EngineState::Running {
            self.state = EngineState::Paused;
        }
    }

    /// Resume the tick loop; a no-op if already running or stopped.
    pub fn resume(&mut self) {
        if self.state == EngineState::Paused {
            self.state = EngineState::Running;
            // Re-base so the next expected time is now, rather than having
            // the pause duration register as a timing slip.
            self.start_time = Some(Instant::now() - self.expected_offset());
        }
    }

    /// Terminate the engine; terminal, idempotent.
    pub fn stop(&mut self) {
        self.state = EngineState::Stopped;
    }

    /// Jump to `position_seconds`, clamped into `[0, num_bins)`, and re-base
    /// the expected-time schedule so the next tick is due immediately.
    pub fn seek(&mut self, position_seconds: f64) {
        let bin = (position_seconds * TICK_HZ as f64).floor().max(0.0) as u64;
        self.cursor = bin.min(self.num_bins.saturating_sub(1));
        if self.state != EngineState::Fresh {
            self.start_time = Some(Instant::now() - self.expected_offset());
        }
    }

    /// Reset the cursor to the beginning, preserving the sequence counter
    /// (used by the fan-out layer when `loop = true` and end-of-stream is
    /// reached).
    pub fn loop_to_start(&mut self) {
        self.cursor = 0;
    }

    /// Record a wire round-trip latency sample, in milliseconds, observed
    /// by the fan-out layer after sending a packet.
    pub fn record_latency(&mut self, latency_ms: f64) {
        self.network_latency_ms.push(latency_ms);
    }

    /// Record one dropped packet: a `SendError` that ended a connection, or
    /// a `DatasetReadError` on an individual window (§7, Open Question
    /// resolution 4).
    pub fn record_dropped(&mut self) {
        self.dropped_packets += 1;
    }

    /// Snapshot the engine's counters for the metrics/control surface.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            packets_sent: self.packets_sent,
            dropped_packets: self.dropped_packets,
            cursor: self.cursor,
            is_running: self.state == EngineState::Running,
            is_paused: self.state == EngineState::Paused,
            timing_error_ms: self.timing_error_ms.summary(),
            network_latency_ms: self.network_latency_ms.summary(),
        }
    }

    fn expected_offset(&self) -> Duration {
        Duration::from_secs_f64(self.sequence as f64 * TICK_INTERVAL_S)
    }

    /// Advance the engine by one emitted packet, suspending until the
    /// packet's expected wall-clock time.
    ///
    /// Returns [`EmitOutcome::Paused`] immediately (without sleeping) while
    /// [`EngineState::Paused`] so the caller can drop its lock on this
    /// engine before idling; holding the lock across a long pause would
    /// starve `pause`/`resume`/`stop`/`seek` calls, which need the same
    /// lock (§5, §8 "Isolation"). Filter mismatches consume bins without
    /// affecting the sequence counter or waiting again; the function loops
    /// internally until it finds a matching bin or the dataset is
    /// exhausted.
    pub async fn tick(&mut self) -> EmitOutcome {
        loop {
            match self.state {
                EngineState::Stopped => return EmitOutcome::EndOfStream,
                EngineState::Paused => return EmitOutcome::Paused,
                EngineState::Fresh => {
                    self.state = EngineState::Running;
                    self.start_time = Some(Instant::now());
                }
                EngineState::Running => {}
            }

            let expected = self.start_time.unwrap() + self.expected_offset();
            let now = Instant::now();
            if expected > now {
                tokio::time::sleep(expected - now).await;
            } else {
                let slip = now - expected;
                if slip > Duration::from_secs_f64(TICK_INTERVAL_S / 2.0) {
                    log::warn!("timing slip: {:.2}ms behind schedule", slip.as_secs_f64() * 1000.0);
                }
            }

            let mut skipped_to_end = true;
            while self.cursor < self.num_bins {
                let bin = self.cursor;
                let packet = self.synthesize(bin);
                self.cursor += 1;

                if self.matches_filters(&packet) {
                    skipped_to_end = false;
                    let now = Instant::now();
                    let expected = self.start_time.unwrap() + self.expected_offset();
                    let timing_error_ms = now
                        .checked_duration_since(expected)
                        .unwrap_or_default()
                        .as_secs_f64()
                        * 1000.0;
                    self.timing_error_ms.push(timing_error_ms);

                    let elapsed_s = bin as f64 * TICK_INTERVAL_S;
                    let packet = match &mut self.noise {
                        Some(stage) => stage.apply(&packet, elapsed_s),
                        None => packet,
                    };

                    self.sequence += 1;
                    self.packets_sent += 1;
                    return EmitOutcome::Emitted(packet);
                }
                // A filter mismatch just consumes the bin (§4.3 "Filters");
                // it is not a `DatasetReadError`/`SendError`, so it must not
                // inflate `dropped_packets` (§7, Open Question resolution 4).
            }

            if skipped_to_end {
                return EmitOutcome::EndOfStream;
            }
        }
    }

    fn matches_filters(&self, packet: &StreamPacket) -> bool {
        if let Some(trial_id) = self.trial_filter {
            if packet.trial_id != Some(trial_id) {
                return false;
            }
        }
        if let Some(target_id) = self.target_filter {
            if packet.intention.target_id() != Some(target_id) {
                return false;
            }
        }
        true
    }

    fn synthesize(&self, bin: u64) -> StreamPacket {
        let t0 = bin as f64 * TICK_INTERVAL_S;
        let t1 = t0 + TICK_INTERVAL_S;

        let spike_matrix = self.dataset.binned_spikes(t0, t1, BIN_SIZE_MS);
        let row = spike_matrix.row(0);
        let channel_ids: Vec<u32> = (0..row.len() as u32).collect();
        let spike_counts: Vec<i64> = row.iter().map(|&c| c as i64).collect();

        let kin = self.dataset.kinematics(t0, t1);
        let kinematics = Kinematics {
            vx: kin.vx.first().copied().unwrap_or(0.0),
            vy: kin.vy.first().copied().unwrap_or(0.0),
            x: kin.x.first().copied().unwrap_or(0.0),
            y: kin.y.first().copied().unwrap_or(0.0),
        };

        let trial = self.dataset.trial_at(t0);
        let (trial_id, trial_time_ms, intention) = match trial {
            Some(trial) => {
                let trial_time_ms = t0 * 1000.0 - trial.t_start * 1000.0;
                let intention = match trial.active_target_position() {
                    Some(pos) => Intention::active(
                        trial.active_target.raw(),
                        pos,
                        (kinematics.x, kinematics.y),
                    ),
                    None => Intention::None,
                };
                (Some(trial.id.raw()), Some(trial_time_ms), intention)
            }
            None => (None, None, Intention::None),
        };

        StreamPacket {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64(),
            sequence_number: self.sequence,
            spikes: SpikeData {
                channel_ids,
                spike_counts,
                bin_size_ms: BIN_SIZE_MS,
            },
            kinematics,
            intention,
            trial_id,
            trial_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurastream_dataset::{BehaviorTrace, MemoryDataset, SpikeTrains, Trial};

    fn toy_dataset() -> Arc<dyn Dataset> {
        let spikes = SpikeTrains::new(vec![vec![0.01, 0.05], vec![0.02]]);
        let behavior = BehaviorTrace {
            t: vec![0.0, 0.025, 0.05, 0.075],
            x: vec![0.0, 1.0, 2.0, 3.0],
            y: vec![0.0, -1.0, -2.0, -3.0],
            vx: vec![0.0, 10.0, 10.0, 10.0],
            vy: vec![0.0, -10.0, -10.0, -10.0],
        };
        let trials = vec![Trial {
            id: neurastream_dataset::TrialId::new(0),
            t_start: 0.0,
            t_stop: 0.1,
            success: true,
            num_targets: 1,
            active_target: neurastream_dataset::TargetId::new(0),
            target_positions: vec![(5.0, 5.0)],
        }];
        Arc::new(MemoryDataset::new(2, 0.1, 40.0, spikes, behavior, trials))
    }

    #[tokio::test]
    async fn test_tick_emits_contiguous_sequence_numbers() {
        let mut engine = PlaybackEngine::new(toy_dataset());
        for expected in 0..4u64 {
            match engine.tick().await {
                EmitOutcome::Emitted(packet) => assert_eq!(packet.sequence_number, expected),
                _ => panic!("expected Emitted"),
            }
        }
        matches!(engine.tick().await, EmitOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn test_pause_idempotent_and_resume() {
        let mut engine = PlaybackEngine::new(toy_dataset());
        engine.pause(); // no-op: still Fresh
        assert_eq!(engine.state(), EngineState::Fresh);

        match engine.tick().await {
            EmitOutcome::Emitted(_) => {}
            _ => panic!("expected Emitted"),
        }
        assert_eq!(engine.state(), EngineState::Running);
        engine.pause();
        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        engine.resume();
        engine.resume();
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[tokio::test]
    async fn test_filter_skips_without_affecting_sequence_contiguity() {
        let mut engine = PlaybackEngine::new(toy_dataset());
        engine.set_filters(Some(0), None);
        let mut last_seq = None;
        loop {
            match engine.tick().await {
                EmitOutcome::Emitted(packet) => {
                    assert_eq!(packet.trial_id, Some(0));
                    if let Some(last) = last_seq {
                        assert_eq!(packet.sequence_number, last + 1);
                    }
                    last_seq = Some(packet.sequence_number);
                }
                EmitOutcome::EndOfStream => break,
                EmitOutcome::Dropped => {}
                EmitOutcome::Paused => unreachable!("engine is never paused in this test"),
            }
        }
    }

    #[tokio::test]
    async fn test_seek_clamps_into_range() {
        let mut engine = PlaybackEngine::new(toy_dataset());
        engine.seek(1000.0);
        assert_eq!(engine.cursor(), engine.num_bins() - 1);
        engine.seek(-5.0);
        assert_eq!(engine.cursor(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_terminal() {
        let mut engine = PlaybackEngine::new(toy_dataset());
        engine.stop();
        matches!(engine.tick().await, EmitOutcome::EndOfStream);
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
