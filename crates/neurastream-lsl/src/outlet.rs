//! Dedicated-thread LSL outlet, only compiled with the `lsl` feature.
//!
//! `liblsl` outlets are not `Send` across an await point in practice, so the
//! outlet lives on its own OS thread and receives samples over a bounded
//! channel, mirroring how other Rust LSL bridges isolate the native handle.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use lsl::Pushable;
use tokio::sync::mpsc;

use crate::config::LslConfig;
use crate::error::{LslError, Result};

pub struct LslOutletWorker {
    sample_tx: mpsc::Sender<Vec<f32>>,
    _thread_handle: JoinHandle<()>,
}

impl LslOutletWorker {
    pub fn spawn(config: LslConfig) -> Result<Self> {
        let (sample_tx, mut sample_rx) = mpsc::channel::<Vec<f32>>(1024);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<std::result::Result<(), String>>(1);

        let thread_handle = std::thread::Builder::new()
            .name("lsl-outlet-neurastream".to_string())
            .spawn(move || {
                let info = match lsl::StreamInfo::new(
                    &config.stream_name,
                    &config.stream_type,
                    config.num_channels as usize,
                    40.0,
                    lsl::ChannelFormat::Float32,
                    &config.source_id,
                ) {
                    Ok(info) => info,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                        return;
                    }
                };

                let outlet = match lsl::StreamOutlet::new(&info, 0, 360) {
                    Ok(outlet) => outlet,
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("{err:?}")));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Some(sample) = sample_rx.blocking_recv() {
                    if let Err(err) = outlet.push_sample(&sample) {
                        log::warn!("failed to push LSL sample: {err:?}");
                    }
                }
            })
            .map_err(|err| LslError::WorkerStartup {
                reason: err.to_string(),
            })?;

        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(())) => Ok(Self {
                sample_tx,
                _thread_handle: thread_handle,
            }),
            Ok(Err(reason)) => Err(LslError::WorkerStartup { reason }),
            Err(_) => Err(LslError::WorkerStartup {
                reason: "outlet worker did not report readiness within 2s".into(),
            }),
        }
    }

    /// Enqueue a sample; returns `false` if the channel is full or closed.
    pub fn try_push(&self, sample: Vec<f32>) -> bool {
        self.sample_tx.try_send(sample).is_ok()
    }
}
