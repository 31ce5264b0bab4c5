//! Streaming fan-out layer (§4.5, §6.2): one WebSocket handler per wire
//! encoding, sharing a generic per-connection driver loop.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Serialize;

use neurastream_core::{EmitOutcome, StreamMetadata, StreamPacket};

use crate::state::AppState;

/// A wire encoding for the two streaming endpoints.
trait WireEncoder {
    /// Encode a JSON-shaped envelope value into a WebSocket message.
    fn encode(&self, envelope: &impl Serialize) -> Message;
}

struct JsonEncoder;

impl WireEncoder for JsonEncoder {
    fn encode(&self, envelope: &impl Serialize) -> Message {
        Message::Text(serde_json::to_string(envelope).unwrap_or_default())
    }
}

struct MsgPackEncoder;

impl WireEncoder for MsgPackEncoder {
    fn encode(&self, envelope: &impl Serialize) -> Message {
        Message::Binary(rmp_serde::to_vec_named(envelope).unwrap_or_default())
    }
}

#[derive(Serialize)]
struct MetadataEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    data: StreamMetadata,
    session: SessionInfoWire,
}

#[derive(Serialize)]
struct SessionInfoWire {
    code: String,
    url: String,
}

#[derive(Serialize)]
struct DataEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    data: StreamPacket,
}

/// `GET /stream/{code}` — text/JSON encoding.
pub async fn stream_json(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    ws.on_upgrade(move |socket| run_stream(socket, state, code, params, JsonEncoder, "/stream"))
}

/// `GET /stream/binary/{code}` — binary/MessagePack encoding.
pub async fn stream_binary(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    ws.on_upgrade(move |socket| {
        run_stream(socket, state, code, params, MsgPackEncoder, "/stream/binary")
    })
}

fn parse_filter(params: &HashMap<String, String>, key: &str) -> Option<u32> {
    params.get(key).and_then(|v| v.parse().ok())
}

/// `loop=false`/`loop=0` opts out; any other value, or the key's absence,
/// keeps the default of looping back to bin 0 at end-of-stream (§4.3, §8
/// "Loop continuity").
fn parse_loop_flag(params: &HashMap<String, String>) -> bool {
    match params.get("loop").map(String::as_str) {
        Some("false") | Some("0") => false,
        _ => true,
    }
}

async fn run_stream<E: WireEncoder>(
    mut socket: WebSocket,
    state: AppState,
    code: String,
    params: HashMap<String, String>,
    encoder: E,
    url_prefix: &str,
) {
    if !state.sessions.contains(&code) {
        if let Err(err) = state.sessions.create(Some(code.clone())) {
            tracing::warn!("failed to auto-create session {code}: {err}");
            let _ = socket.close().await;
            return;
        }
    }

    let trial_filter = parse_filter(&params, "trial_id");
    let target_filter = parse_filter(&params, "target_id");
    let loop_playback = parse_loop_flag(&params);
    let _ = state
        .sessions
        .with_engine_mut(&code, |engine| engine.set_filters(trial_filter, target_filter))
        .await;

    state.sessions.increment_connections(&code);

    let metadata = MetadataEnvelope {
        kind: "metadata",
        data: StreamMetadata {
            dataset: state.dataset_display_name(),
            total_packets: (state.dataset.duration_seconds()
                * state.settings.stream_frequency_hz as f64)
                .floor() as u64,
            frequency_hz: state.settings.stream_frequency_hz,
            num_channels: state.dataset.num_channels(),
            duration_seconds: state.dataset.duration_seconds(),
            num_trials: state.dataset.trial_list().len() as u32,
        },
        session: SessionInfoWire {
            code: code.clone(),
            url: format!("{url_prefix}/{code}"),
        },
    };
    if socket.send(encoder.encode(&metadata)).await.is_err() {
        state.sessions.decrement_connections(&code);
        return;
    }

    // Tracks whether any bin matched the active filters during the current
    // pass through the dataset. A filter that matches nothing turns
    // end-of-stream into an immediate re-scan with `loop=true`; without this
    // guard that re-scan never advances the sequence counter, so `engine.rs`
    // never takes its `sleep` branch and the pass spins a worker thread
    // instead of idling or terminating (§8 scenario 3: a filtered stream
    // "ends (or loops) after at most one pass").
    let mut emitted_this_pass = false;

    loop {
        // An unknown code here means the session was deleted concurrently
        // (e.g. by `/api/sessions/cleanup`), which is treated the same as
        // end-of-stream.
        let outcome = match state.sessions.tick(&code).await {
            Ok(outcome) => outcome,
            Err(_) => break,
        };

        match outcome {
            EmitOutcome::Emitted(packet) => {
                emitted_this_pass = true;
                let envelope = DataEnvelope {
                    kind: "data",
                    data: packet.clone(),
                };
                if socket.send(encoder.encode(&envelope)).await.is_err() {
                    let _ = state
                        .sessions
                        .with_engine_mut(&code, |engine| engine.record_dropped())
                        .await;
                    break;
                }

                let latency_ms = (now_wall_seconds() - packet.timestamp).max(0.0) * 1000.0;
                let _ = state
                    .sessions
                    .with_engine_mut(&code, |engine| engine.record_latency(latency_ms))
                    .await;

                let _ = state.side_publisher.try_publish(&code, &packet);

                if let Ok(Some(Ok(_incoming))) =
                    tokio::time::timeout(std::time::Duration::from_millis(1), socket.recv()).await
                {
                    tracing::debug!("ignoring client-originated frame on session {code}");
                }
            }
            EmitOutcome::Dropped => continue,
            EmitOutcome::EndOfStream => {
                if loop_playback && emitted_this_pass {
                    emitted_this_pass = false;
                    let _ = state
                        .sessions
                        .with_engine_mut(&code, |engine| engine.loop_to_start())
                        .await;
                    continue;
                }
                break;
            }
            EmitOutcome::Paused => {
                unreachable!("SessionManager::tick resolves Paused internally")
            }
        }
    }

    state.sessions.decrement_connections(&code);
    let _ = socket.close().await;
}

fn now_wall_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
