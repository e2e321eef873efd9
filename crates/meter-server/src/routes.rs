//! HTTP handlers for the `/api/*` surface (root spec §4.9).

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use meter_stats::manager::now_ms;
use serde::{Deserialize, Serialize};

use crate::history;
use crate::response::{ApiEnvelope, ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_data(State(state): State<AppState>) -> ApiResult<meter_stats::DataSnapshot> {
    Ok(Json(ApiEnvelope::ok(state.manager.snapshot())))
}

#[derive(Debug, Serialize)]
struct EnemySnapshot {
    enemy: HashMap<String, meter_stats::EnemyInfo>,
}

pub async fn get_enemies(State(state): State<AppState>) -> ApiResult<EnemySnapshot> {
    Ok(Json(ApiEnvelope::ok(EnemySnapshot { enemy: state.manager.snapshot().enemy })))
}

pub async fn get_clear(State(state): State<AppState>) -> ApiResult<()> {
    state.manager.clear_all(now_ms());
    Ok(Json(ApiEnvelope::ok_empty()))
}

#[derive(Debug, Serialize)]
struct PauseState {
    paused: bool,
}

pub async fn get_pause(State(state): State<AppState>) -> ApiResult<PauseState> {
    Ok(Json(ApiEnvelope::ok(PauseState { paused: state.manager.is_paused() })))
}

#[derive(Debug, Deserialize)]
pub struct SetPauseRequest {
    paused: bool,
}

pub async fn post_pause(State(state): State<AppState>, Json(body): Json<SetPauseRequest>) -> ApiResult<PauseState> {
    state.manager.set_paused(body.paused);
    Ok(Json(ApiEnvelope::ok(PauseState { paused: body.paused })))
}

pub async fn get_skill(
    State(state): State<AppState>,
    Path(uid): Path<u64>,
) -> ApiResult<Vec<meter_stats::persistence::SkillDetailView>> {
    state.manager.skill_detail(uid).map(ApiEnvelope::ok).map(Json).ok_or(ApiError::NotFound)
}

#[derive(Debug, Serialize)]
struct HistoryList {
    sessions: Vec<String>,
}

pub async fn get_history_list(State(state): State<AppState>) -> ApiResult<HistoryList> {
    let sessions = history::list_sessions(&state.logs_dir)?;
    Ok(Json(ApiEnvelope::ok(HistoryList { sessions })))
}

pub async fn get_history_summary(State(state): State<AppState>, Path(ts): Path<String>) -> ApiResult<serde_json::Value> {
    Ok(Json(ApiEnvelope::ok(history::read_json(&state.logs_dir, &ts, "summary.json")?)))
}

pub async fn get_history_data(State(state): State<AppState>, Path(ts): Path<String>) -> ApiResult<serde_json::Value> {
    Ok(Json(ApiEnvelope::ok(history::read_json(&state.logs_dir, &ts, "allUserData.json")?)))
}

pub async fn get_history_skill(
    State(state): State<AppState>,
    Path((ts, uid)): Path<(String, u64)>,
) -> ApiResult<serde_json::Value> {
    let rel = format!("users/{uid}.json");
    Ok(Json(ApiEnvelope::ok(history::read_json(&state.logs_dir, &ts, &rel)?)))
}

pub async fn get_history_download(State(state): State<AppState>, Path(ts): Path<String>) -> Result<Response, ApiError> {
    history::download_fight_log(&state.logs_dir, &ts)
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<meter_stats::Settings> {
    Ok(Json(ApiEnvelope::ok(state.manager.settings_snapshot())))
}

pub async fn post_settings(
    State(state): State<AppState>,
    Json(patch): Json<serde_json::Value>,
) -> ApiResult<meter_stats::Settings> {
    let settings = state.manager.merge_settings(patch, &state.settings_path)?;
    Ok(Json(ApiEnvelope::ok(settings)))
}
