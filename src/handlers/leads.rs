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
    services::{CreateLeadInput, LeadFilter, LeadPatch},
    ApiResponse, AppState,
};

pub fn lead_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_leads).post(create_lead))
        .route("/:id", get(get_lead).patch(update_lead))
}

pub async fn create_lead(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateLeadInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let lead = state.services.leads.create_lead(payload, &actor).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(lead))))
}

pub async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let lead = state.services.leads.get_lead(id).await?;
    Ok(Json(ApiResponse::success(lead)))
}

pub async fn list_leads(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<LeadFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let leads = state
        .services
        .leads
        .list_leads(filter.scoped_to(&actor))
        .await?;
    Ok(Json(ApiResponse::success(leads)))
}

pub async fn update_lead(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<LeadPatch>,
) -> Result<impl IntoResponse, ServiceError> {
    let lead = state.services.leads.update_lead(id, patch, &actor).await?;
    Ok(Json(ApiResponse::success(lead)))
}
