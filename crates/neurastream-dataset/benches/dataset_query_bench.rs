use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use neurastream_dataset::{BehaviorTrace, Dataset, MemoryDataset, SpikeTrains, Trial};

/// A synthetic dataset shaped like a short `mc_maze` recording: `channels`
/// Poisson-ish spike trains over `duration_s`, a matching behavior trace
/// sampled at 1kHz, and one trial covering the whole window.
fn build_dataset(channels: u32, duration_s: f64) -> MemoryDataset {
    let per_channel: Vec<Vec<f64>> = (0..channels)
        .map(|c| {
            let step = 0.01 + (c as f64) * 0.0001;
            let mut t = step;
            let mut times = Vec::new();
            while t < duration_s {
                times.push(t);
                t += step;
            }
            times
        })
        .collect();

    let behavior_rate = 1000.0;
    let samples = (duration_s * behavior_rate) as usize;
    let t: Vec<f64> = (0..samples).map(|i| i as f64 / behavior_rate).collect();
    let behavior = BehaviorTrace {
        x: t.iter().map(|&t| t.sin()).collect(),
        y: t.iter().map(|&t| t.cos()).collect(),
        vx: vec![0.0; samples],
        vy: vec![0.0; samples],
        t,
    };

    let trials = vec![Trial {
        id: neurastream_dataset::TrialId::new(0),
        t_start: 0.0,
        t_stop: duration_s,
        success: true,
        num_targets: 1,
        active_target: neurastream_dataset::TargetId::new(0),
        target_positions: vec![(1.0, 1.0)],
    }];

    MemoryDataset::new(
        channels,
        duration_s,
        behavior_rate,
        SpikeTrains::new(per_channel),
        behavior,
        trials,
    )
}

/// Benchmarks the per-tick query path (`binned_spikes` + `kinematics` +
/// `trial_at`) the playback engine exercises every 25ms; the real-time
/// contract (§5) requires this to complete in well under one tick.
fn bench_tick_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("dataset_tick_queries");

    for &channels in &[96u32, 182u32, 384u32] {
        let dataset = build_dataset(channels, 60.0);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("binned_spikes_and_kinematics", channels),
            &channels,
            |b, _| {
                let mut t0 = 0.0;
                b.iter(|| {
                    let t1 = t0 + 0.025;
                    let matrix = dataset.binned_spikes(t0, t1, 25.0);
                    let kin = dataset.kinematics(t0, t1);
                    let _ = dataset.trial_at(t0);
                    t0 = if t1 >= dataset.duration_seconds() { 0.0 } else { t1 };
                    std::hint::black_box((matrix.row(0)[0], kin.len()));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_tick_queries);
criterion_main!(benches);
