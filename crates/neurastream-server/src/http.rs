//! HTTP control surface (§6.1): health, dataset metadata, trial queries,
//! session lifecycle, and playback control.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use neurastream_core::StreamMetadata;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Build the router for every non-streaming HTTP route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/metadata", get(metadata))
        .route("/api/trials", get(list_trials))
        .route("/api/trials/:id", get(get_trial))
        .route("/api/trials/by-target/:target_id", get(trials_by_target))
        .route("/api/sessions/create", post(create_session))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:code", get(get_session))
        .route("/api/sessions/:code", delete(delete_session))
        .route("/api/sessions/cleanup", post(cleanup_sessions))
        .route("/api/control/:code/pause", post(pause_session))
        .route("/api/control/:code/resume", post(resume_session))
        .route("/api/control/:code/stop", post(stop_session))
        .route("/api/control/:code/seek", post(seek_session))
        .route("/metrics", get(crate::metrics::snapshot))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let stats = state.sessions.stats();
    Json(json!({
        "status": "ok",
        "active_connections": stats.active_connections,
        "active_sessions": stats.total_sessions,
    }))
}

async fn metadata(State(state): State<AppState>) -> Json<StreamMetadata> {
    let dataset = &state.dataset;
    Json(StreamMetadata {
        dataset: state.dataset_display_name(),
        total_packets: (dataset.duration_seconds() * state.settings.stream_frequency_hz as f64)
            .floor() as u64,
        frequency_hz: state.settings.stream_frequency_hz,
        num_channels: dataset.num_channels(),
        duration_seconds: dataset.duration_seconds(),
        num_trials: dataset.trial_list().len() as u32,
    })
}

async fn list_trials(State(state): State<AppState>) -> Json<Value> {
    let trials = state.dataset.trial_list();
    Json(json!({
        "trials": trials.iter().map(trial_to_json).collect::<Vec<_>>(),
        "count": trials.len(),
    }))
}

async fn get_trial(State(state): State<AppState>, Path(id): Path<u32>) -> Result<Json<Value>> {
    let trial = state
        .dataset
        .trial(neurastream_dataset::TrialId::new(id))
        .ok_or_else(|| ApiError::not_found(format!("trial {id}")))?;
    Ok(Json(trial_to_json(trial)))
}

async fn trials_by_target(
    State(state): State<AppState>,
    Path(target_id): Path<u32>,
) -> Json<Value> {
    let trials = state
        .dataset
        .trials_for_target(neurastream_dataset::TargetId::new(target_id));
    Json(json!({
        "trials": trials.iter().map(|t| trial_to_json(t)).collect::<Vec<_>>(),
        "count": trials.len(),
        "target_index": target_id,
    }))
}

fn trial_to_json(trial: &neurastream_dataset::Trial) -> Value {
    json!({
        "trial_id": trial.id.raw(),
        "t_start": trial.t_start,
        "t_stop": trial.t_stop,
        "success": trial.success,
        "num_targets": trial.num_targets,
        "active_target": trial.active_target.raw(),
        "target_positions": trial.target_positions,
    })
}

async fn create_session(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let custom_code = params.get("custom_code").cloned();
    let code = state.sessions.create(custom_code)?;
    if let Some(noise_config) = state.noise_config {
        let _ = state
            .sessions
            .with_engine_mut(&code, |engine| {
                engine.set_noise(neurastream_core::NoiseStage::new(noise_config));
            })
            .await;
    }
    Ok(Json(json!({
        "session_code": code,
        "stream_url": format!("/stream/{code}"),
        "created": true,
    })))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.sessions.list();
    let stats = state.sessions.stats();
    Json(json!({
        "sessions": sessions.iter().map(|s| json!({
            "session_code": s.session_code,
            "age_seconds": s.age_seconds,
            "idle_seconds": s.idle_seconds,
            "connections": s.connections,
        })).collect::<Vec<_>>(),
        "stats": {
            "total_sessions": stats.total_sessions,
            "max_sessions": stats.max_sessions,
            "session_ttl": stats.session_ttl,
            "active_connections": stats.active_connections,
            "running_sessions": stats.running_sessions,
        },
    }))
}

async fn get_session(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>> {
    state
        .sessions
        .with_engine(&code, |engine| {
            let stats = engine.stats();
            json!({
                "session_code": code,
                "is_running": stats.is_running,
                "is_paused": stats.is_paused,
                "current_index": stats.cursor,
                "packets_sent": stats.packets_sent,
                "dropped_packets": stats.dropped_packets,
            })
        })
        .await
        .map(Json)
        .map_err(ApiError::from)
}

async fn delete_session(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>> {
    let deleted = state.sessions.delete(&code)?;
    if !deleted {
        return Err(ApiError::not_found(format!("session {code}")));
    }
    Ok(Json(json!({ "deleted": true, "code": code })))
}

async fn cleanup_sessions(State(state): State<AppState>) -> Json<Value> {
    let cleaned_up = state.sessions.cleanup_expired();
    Json(json!({ "cleaned_up": cleaned_up }))
}

async fn pause_session(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>> {
    state
        .sessions
        .with_engine_mut(&code, |engine| engine.pause())
        .await?;
    Ok(Json(json!({ "status": "paused", "code": code })))
}

async fn resume_session(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>> {
    state
        .sessions
        .with_engine_mut(&code, |engine| engine.resume())
        .await?;
    Ok(Json(json!({ "status": "resumed", "code": code })))
}

async fn stop_session(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Value>> {
    state
        .sessions
        .with_engine_mut(&code, |engine| engine.stop())
        .await?;
    Ok(Json(json!({ "status": "stopped", "code": code })))
}

async fn seek_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let position_seconds: f64 = params
        .get("position_seconds")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ApiError::config("position_seconds query parameter is required"))?;
    state
        .sessions
        .with_engine_mut(&code, |engine| engine.seek(position_seconds))
        .await?;
    Ok(Json(json!({ "status": "seeked", "position": position_seconds, "code": code })))
}
