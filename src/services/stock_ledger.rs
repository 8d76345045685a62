use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{is_unique_violation, with_transaction},
    entities::{product, raw_material},
    errors::ServiceError,
};

/// Attempts per stock adjustment before giving up on a contended row
const STOCK_WRITE_ATTEMPTS: usize = 5;

pub(crate) fn material_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Raw material {} not found", id))
}

pub(crate) fn product_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Product {} not found", id))
}

/// Overwrites the material's quantity if the row is still at `current.version`.
/// Returns false when another writer got there first.
pub(crate) async fn write_material_quantity<C: ConnectionTrait>(
    conn: &C,
    current: &raw_material::Model,
    quantity: Decimal,
) -> Result<bool, ServiceError> {
    let result = raw_material::Entity::update_many()
        .col_expr(raw_material::Column::CurrentQuantity, Expr::value(quantity))
        .col_expr(raw_material::Column::Version, Expr::value(current.version + 1))
        .col_expr(raw_material::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(raw_material::Column::Id.eq(current.id))
        .filter(raw_material::Column::Version.eq(current.version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Overwrites the product's stock if the row is still at `current.version`.
pub(crate) async fn write_product_stock<C: ConnectionTrait>(
    conn: &C,
    current: &product::Model,
    stock: Decimal,
) -> Result<bool, ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(product::Column::StockQuantity, Expr::value(stock))
        .col_expr(product::Column::Version, Expr::value(current.version + 1))
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(current.id))
        .filter(product::Column::Version.eq(current.version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Adds `delta` (negative to consume) to a material's on-hand quantity.
///
/// The new value is computed in `Decimal` and written with a version check;
/// a lost check re-reads the row and tries again. With `require_active` an
/// inactive material is reported as missing.
pub(crate) async fn adjust_material<C: ConnectionTrait>(
    conn: &C,
    material_id: Uuid,
    delta: Decimal,
    require_active: bool,
) -> Result<raw_material::Model, ServiceError> {
    for attempt in 1..=STOCK_WRITE_ATTEMPTS {
        let material = raw_material::Entity::find_by_id(material_id)
            .one(conn)
            .await?
            .filter(|m| m.is_active || !require_active)
            .ok_or_else(|| material_not_found(material_id))?;

        let quantity = material.current_quantity + delta;
        if quantity < Decimal::ZERO {
            return Err(ServiceError::InsufficientStock(format!(
                "Raw material {} has {} {}, needs {}",
                material.name, material.current_quantity, material.unit, -delta
            )));
        }

        if write_material_quantity(conn, &material, quantity).await? {
            return Ok(raw_material::Model {
                current_quantity: quantity,
                version: material.version + 1,
                ..material
            });
        }
        counter!("ledger.stock.write_retries", 1);
        warn!(%material_id, attempt, "raw material changed concurrently, retrying");
    }

    Err(ServiceError::Conflict(format!(
        "Raw material {} is being changed concurrently, try again",
        material_id
    )))
}

/// Adds `delta` (negative to remove) to a product's finished-goods stock.
pub(crate) async fn adjust_product<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    delta: Decimal,
    require_active: bool,
) -> Result<product::Model, ServiceError> {
    for attempt in 1..=STOCK_WRITE_ATTEMPTS {
        let product = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .filter(|p| p.is_active || !require_active)
            .ok_or_else(|| product_not_found(product_id))?;

        let stock = product.stock_quantity + delta;
        if stock < Decimal::ZERO {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {} has {} in stock, needs {}",
                product.name, product.stock_quantity, -delta
            )));
        }

        if write_product_stock(conn, &product, stock).await? {
            return Ok(product::Model {
                stock_quantity: stock,
                version: product.version + 1,
                ..product
            });
        }
        counter!("ledger.stock.write_retries", 1);
        warn!(%product_id, attempt, "product changed concurrently, retrying");
    }

    Err(ServiceError::Conflict(format!(
        "Product {} is being changed concurrently, try again",
        product_id
    )))
}

/// Registration payload for a raw material and its opening balance
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewRawMaterial {
    #[validate(length(min = 1, max = 255, message = "Material name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 32, message = "Unit must be between 1 and 32 characters"))]
    pub unit: String,
    #[serde(default)]
    pub opening_quantity: Decimal,
}

/// Registration payload for a finished product and its opening stock
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255, message = "Product name must be between 1 and 255 characters"))]
    pub name: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub opening_stock: Decimal,
    #[serde(default)]
    pub price: Decimal,
}

/// Reads and registration for the two stock counters.
///
/// Methods here never move a counter after registration; consumption and
/// production go through the manufacturing service and [`adjust_material`] /
/// [`adjust_product`].
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn register_material(
        &self,
        input: NewRawMaterial,
    ) -> Result<raw_material::Model, ServiceError> {
        input.validate()?;
        if input.opening_quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "opening_quantity cannot be negative".to_string(),
            ));
        }

        let name = input.name.trim().to_string();
        let conflict_name = name.clone();
        let material = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                raw_material::ActiveModel {
                    name: Set(name),
                    unit: Set(input.unit.trim().to_string()),
                    current_quantity: Set(input.opening_quantity),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        ServiceError::Conflict(format!(
                            "Raw material '{}' already exists",
                            conflict_name
                        ))
                    } else {
                        ServiceError::from(e)
                    }
                })
            })
        })
        .await?;

        counter!("ledger.stock.materials_registered", 1);
        info!(material_id = %material.id, quantity = %material.current_quantity, "raw material registered");
        Ok(material)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn register_product(&self, input: NewProduct) -> Result<product::Model, ServiceError> {
        input.validate()?;
        if input.opening_stock < Decimal::ZERO || input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "opening_stock and price cannot be negative".to_string(),
            ));
        }

        let product = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let product = product::ActiveModel {
                    name: Set(input.name.trim().to_string()),
                    category_id: Set(input.category_id),
                    stock_quantity: Set(input.opening_stock),
                    price: Set(input.price),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                Ok::<_, ServiceError>(product)
            })
        })
        .await?;

        counter!("ledger.stock.products_registered", 1);
        info!(product_id = %product.id, stock = %product.stock_quantity, "product registered");
        Ok(product)
    }

    pub async fn get_material(&self, id: Uuid) -> Result<raw_material::Model, ServiceError> {
        raw_material::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| material_not_found(id))
    }

    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| product_not_found(id))
    }

    pub async fn list_materials(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<raw_material::Model>, ServiceError> {
        let mut query = raw_material::Entity::find().order_by_asc(raw_material::Column::Name);
        if !include_inactive {
            query = query.filter(raw_material::Column::IsActive.eq(true));
        }
        Ok(query.all(&*self.db).await?)
    }

    pub async fn list_products(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = product::Entity::find().order_by_asc(product::Column::Name);
        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        Ok(query.all(&*self.db).await?)
    }

    /// Activates or retires a material. Inactive materials cannot be consumed.
    #[instrument(skip(self))]
    pub async fn set_material_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<raw_material::Model, ServiceError> {
        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let material = raw_material::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| material_not_found(id))?;
                let mut active_model: raw_material::ActiveModel = material.into();
                active_model.is_active = Set(active);
                Ok::<_, ServiceError>(active_model.update(txn).await?)
            })
        })
        .await
    }

    /// Activates or retires a product. Inactive products cannot be produced.
    #[instrument(skip(self))]
    pub async fn set_product_active(
        &self,
        id: Uuid,
        active: bool,
    ) -> Result<product::Model, ServiceError> {
        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let product = product::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| product_not_found(id))?;
                let mut active_model: product::ActiveModel = product.into();
                active_model.is_active = Set(active);
                Ok::<_, ServiceError>(active_model.update(txn).await?)
            })
        })
        .await
    }
}
