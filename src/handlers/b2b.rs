use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use crate::{
    auth::Actor,
    errors::ServiceError,
    services::{B2bFilter, B2bPatch, NewB2bRecord},
    ApiResponse, AppState,
};

pub fn b2b_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/:id", get(get_record).patch(update_record))
}

pub async fn create_record(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewB2bRecord>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state.services.b2b.create(payload, &actor).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(record))))
}

pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state.services.b2b.get(id).await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn list_records(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<B2bFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let records = state.services.b2b.list(filter.scoped_to(&actor)).await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn update_record(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<B2bPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state.services.b2b.update(id, patch, &actor).await?;
    Ok(Json(ApiResponse::success(record)))
}
