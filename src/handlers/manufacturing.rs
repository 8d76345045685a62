use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::Actor,
    entities::manufacturing_log,
    errors::ServiceError,
    services::{LogFilter, ProductionRequest},
    ApiResponse, AppState,
};

/// A log together with whether its stock effect has been undone
#[derive(Debug, Serialize)]
pub struct ManufacturingLogView {
    #[serde(flatten)]
    pub log: manufacturing_log::Model,
    pub reversed: bool,
}

pub fn manufacturing_routes() -> Router<AppState> {
    Router::new()
        .route("/logs", get(list_logs).post(record_production))
        .route("/logs/:id", get(get_log))
        .route("/logs/:id/reverse", post(reverse_production))
}

pub async fn record_production(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ProductionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let log = state
        .services
        .manufacturing
        .record_production(payload, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(log))))
}

pub async fn reverse_production(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let reversal = state
        .services
        .manufacturing
        .reverse_production(id, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(reversal))))
}

pub async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let manufacturing = &state.services.manufacturing;
    let log = manufacturing.get_log(id).await?;
    let reversed = manufacturing.is_reversed(id).await?;
    Ok(Json(ApiResponse::success(ManufacturingLogView { log, reversed })))
}

pub async fn list_logs(
    State(state): State<AppState>,
    Query(filter): Query<LogFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let logs = state.services.manufacturing.list_logs(filter).await?;
    Ok(Json(ApiResponse::success(logs)))
}
