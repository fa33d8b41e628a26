use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::info;

use super::{
    error::ApiError,
    models::{
        ActiveUploadsResponse, CancelResponse, EnqueueRequest, HealthResponse, PauseResponse,
        UploadListResponse,
    },
    state::AppState,
};
use crate::records::{CreatedBy, NewUpload};

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "uploads".to_string(),
        if state.preferences.is_global_upload_paused() {
            "paused".to_string()
        } else {
            "running".to_string()
        },
    );

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}

/// Uploads in flight right now (GET /uploads/active)
pub async fn active_uploads(State(state): State<AppState>) -> impl IntoResponse {
    Json(ActiveUploadsResponse {
        ids: state.registry.active_ids(),
    })
}

/// Cancel an in-flight upload (POST /uploads/{id}/cancel)
///
/// Only reaches uploads that are executing. Queued uploads are not touched.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.registry.cancel(id) {
        return Err(ApiError::NotFound(format!("upload {id} is not in flight")));
    }

    info!(upload_id = id, "Upload cancelled via API");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            id,
            cancelled: true,
        }),
    ))
}

/// POST /pause
pub async fn pause(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    set_paused(&state, true)
}

/// POST /resume
pub async fn resume(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    set_paused(&state, false)
}

fn set_paused(state: &AppState, paused: bool) -> Result<Json<PauseResponse>, ApiError> {
    state.preferences.set_global_upload_paused(paused)?;
    info!(paused, "Global upload pause changed");
    Ok(Json(PauseResponse { paused }))
}

/// Queue a new upload (POST /uploads)
pub async fn enqueue_upload(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.account.trim().is_empty() {
        return Err(ApiError::InvalidPayload("account must not be blank".into()));
    }
    if request.remote_path.trim_matches('/').is_empty() {
        return Err(ApiError::InvalidPayload(
            "remote_path must name a file".into(),
        ));
    }

    let upload = NewUpload::new(request.account, request.local_path, request.remote_path)
        .with_local_behaviour(request.local_behaviour)
        .with_collision_policy(request.name_collision_policy)
        .with_created_by(CreatedBy::Api);
    let record = state.store.insert(upload).await?;

    info!(upload_id = record.id, account = %record.account_name, "Upload queued via API");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /accounts/{account}/uploads
pub async fn list_uploads(
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let uploads = state.store.list(&account).await?;
    Ok(Json(UploadListResponse { account, uploads }))
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
