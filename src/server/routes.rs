//! JSON API handlers for forms, responses and analytics.

use super::error::ApiError;
use super::AppState;
use crate::models::{new_id, Form, FormDraft, Response, Snapshot};
use crate::seed;
use crate::validation;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

/// Run store-writing work on the blocking pool; a data file write must
/// not stall the async workers serving streams.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {}", e)))?
}

/// Liveness probe.
pub async fn healthz() -> &'static str {
    "ok"
}

/// Health details for operators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub live_topics: usize,
    pub live_subscribers: usize,
}

/// GET /api/health
pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let broker = state.live.broker();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        live_topics: broker.topic_count(),
        live_subscribers: broker.total_subscribers(),
    })
}

/// POST /api/forms
pub async fn create_form(
    State(state): State<AppState>,
    body: Result<Json<FormDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Form>), ApiError> {
    let Json(draft) = body.map_err(|_| ApiError::BadRequest("invalid body".to_string()))?;
    let (title, fields) = validation::normalize_form(draft)?;

    let live = state.live.clone();
    let form = blocking(move || {
        Ok(live.store().create_form(Form {
            id: new_id(),
            title,
            fields,
            created_at: Utc::now(),
        })?)
    })
    .await?;

    info!(form_id = %form.id, fields = form.fields.len(), "Form created");
    Ok((StatusCode::CREATED, Json(form)))
}

/// GET /api/forms/{id}
pub async fn get_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Form>, ApiError> {
    Ok(Json(state.live.store().find_form(&id)?))
}

/// PUT /api/forms/{id}
pub async fn update_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<FormDraft>, JsonRejection>,
) -> Result<Json<Form>, ApiError> {
    let Json(draft) = body.map_err(|_| ApiError::BadRequest("invalid body".to_string()))?;
    let (title, fields) = validation::normalize_form(draft)?;

    let live = state.live.clone();
    let form = blocking(move || Ok(live.store().update_form(&id, title, fields)?)).await?;

    info!(form_id = %form.id, "Form updated");
    Ok(Json(form))
}

/// POST /api/forms/{id}/responses
pub async fn submit_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Response>), ApiError> {
    let Json(body) = body.map_err(|_| ApiError::BadRequest("invalid json".to_string()))?;
    let live = state.live.clone();
    let response = blocking(move || Ok(live.submit(&id, &body)?)).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/forms/{id}/analytics
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(state.live.snapshot(&id)?))
}

/// POST /api/seed
pub async fn seed_demo(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let live = state.live.clone();
    let count = state.seed_responses;
    let form = blocking(move || Ok(seed::seed_demo(live.store(), count)?)).await?;
    Ok(Json(json!({
        "message": "Seeded successfully",
        "formId": form.id,
    })))
}
