use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::Actor,
    errors::ServiceError,
    services::{NewProduct, NewRawMaterial},
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct StockListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// Body of `PATCH /raw-materials/:id` and `PATCH /products/:id`
#[derive(Debug, Deserialize)]
pub struct StockActivation {
    pub is_active: bool,
}

fn require_manager(actor: &Actor, action: &str) -> Result<(), ServiceError> {
    if actor.is_manager_or_above() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!("Only managers can {}", action)))
    }
}

pub fn raw_material_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_materials).post(register_material))
        .route("/:id", get(get_material).patch(set_material_active))
}

pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(register_product))
        .route("/:id", get(get_product).patch(set_product_active))
}

pub async fn register_material(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewRawMaterial>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::debug!(actor_id = %actor.id, "registering raw material");
    let material = state.services.stock.register_material(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(material))))
}

pub async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let material = state.services.stock.get_material(id).await?;
    Ok(Json(ApiResponse::success(material)))
}

pub async fn set_material_active(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockActivation>,
) -> Result<impl IntoResponse, ServiceError> {
    require_manager(&actor, "activate or retire raw materials")?;
    let material = state
        .services
        .stock
        .set_material_active(id, payload.is_active)
        .await?;
    tracing::info!(
        actor_id = %actor.id,
        material_id = %id,
        is_active = payload.is_active,
        "raw material activation changed"
    );
    Ok(Json(ApiResponse::success(material)))
}

pub async fn list_materials(
    State(state): State<AppState>,
    Query(query): Query<StockListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let materials = state
        .services
        .stock
        .list_materials(query.include_inactive)
        .await?;
    Ok(Json(ApiResponse::success(materials)))
}

pub async fn register_product(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<NewProduct>,
) -> Result<impl IntoResponse, ServiceError> {
    tracing::debug!(actor_id = %actor.id, "registering product");
    let product = state.services.stock.register_product(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.stock.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn set_product_active(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockActivation>,
) -> Result<impl IntoResponse, ServiceError> {
    require_manager(&actor, "activate or retire products")?;
    let product = state
        .services
        .stock
        .set_product_active(id, payload.is_active)
        .await?;
    tracing::info!(
        actor_id = %actor.id,
        product_id = %id,
        is_active = payload.is_active,
        "product activation changed"
    );
    Ok(Json(ApiResponse::success(product)))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<StockListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .stock
        .list_products(query.include_inactive)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}
