//! `/metrics` snapshot endpoint (§7)

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn snapshot(State(state): State<AppState>) -> Json<Value> {
    let manager_stats = state.sessions.stats();
    let sessions = state.sessions.list();

    let mut session_metrics = serde_json::Map::new();
    for session in &sessions {
        let mut entry = state
            .sessions
            .with_engine(&session.session_code, engine_metrics)
            .await
            .unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut entry {
            map.insert("connections".to_string(), json!(session.connections));
            // Per-session memory accounting is not tracked; every session
            // shares the one read-only dataset mapping.
            map.insert("memory_usage_mb".to_string(), json!(0.0));
        }
        session_metrics.insert(session.session_code.clone(), entry);
    }

    Json(json!({
        "timestamp": SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64(),
        "service": "neurastream-server",
        "version": env!("CARGO_PKG_VERSION"),
        "metrics": {
            "total_sessions": manager_stats.total_sessions,
            "active_sessions": manager_stats.running_sessions,
            "total_connections": manager_stats.active_connections,
            "sessions": session_metrics,
        },
    }))
}

fn engine_metrics(engine: &neurastream_core::PlaybackEngine) -> Value {
    let stats = engine.stats();
    json!({
        "packets_sent": stats.packets_sent,
        "dropped_packets": stats.dropped_packets,
        "network_latency_ms": stats.network_latency_ms.map(summary_json).unwrap_or(json!(null)),
        "timing_error_ms": stats.timing_error_ms.map(summary_json).unwrap_or(json!(null)),
        "is_running": stats.is_running,
        "is_paused": stats.is_paused,
    })
}

fn summary_json(summary: neurastream_core::StatsSummary) -> Value {
    json!({ "mean": summary.mean, "std": summary.std, "max": summary.max })
}
