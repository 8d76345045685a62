use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::{is_unique_violation, with_transaction},
    entities::{manufacturing_log, manufacturing_reversal},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger::{adjust_material, adjust_product},
};

/// One production run: consume `quantity_used` of a material, yield
/// `manufactured_qty` units of a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub product_id: Uuid,
    pub material_id: Uuid,
    pub quantity_used: Decimal,
    pub manufactured_qty: Decimal,
}

impl ProductionRequest {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity_used <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "quantity_used must be positive, got: {}",
                self.quantity_used
            )));
        }
        if self.manufactured_qty <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "manufactured_qty must be positive, got: {}",
                self.manufactured_qty
            )));
        }
        Ok(())
    }
}

/// Optional narrowing for log listings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub product_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
}

/// Manufacturing ledger: the only writer of the material and product counters
#[derive(Clone)]
pub struct ManufacturingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ManufacturingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records a production run.
    ///
    /// Material decrement, product increment and the log insert commit
    /// together or not at all. Each counter write is checked against the
    /// row version it was computed from, so two concurrent runs can never
    /// both spend the same stock.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn record_production(
        &self,
        request: ProductionRequest,
        actor: &Actor,
    ) -> Result<manufacturing_log::Model, ServiceError> {
        request.validate()?;

        let started = Instant::now();
        let actor_id = actor.id;
        let ProductionRequest {
            product_id,
            material_id,
            quantity_used,
            manufactured_qty,
        } = request;

        let result = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                adjust_material(txn, material_id, -quantity_used, true).await?;
                adjust_product(txn, product_id, manufactured_qty, true).await?;

                let log = manufacturing_log::ActiveModel {
                    product_id: Set(product_id),
                    material_id: Set(material_id),
                    quantity_used: Set(quantity_used),
                    manufactured_qty: Set(manufactured_qty),
                    created_by: Set(actor_id),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                Ok::<_, ServiceError>(log)
            })
        })
        .await;

        histogram!("ledger.production.duration", started.elapsed());
        let log = match result {
            Ok(log) => log,
            Err(err) => {
                counter!("ledger.production.failed", 1);
                warn!(%material_id, %product_id, error = %err, "production run rejected");
                return Err(err);
            }
        };

        counter!("ledger.production.recorded", 1);
        info!(
            log_id = %log.id,
            %material_id,
            %product_id,
            %quantity_used,
            %manufactured_qty,
            "production recorded"
        );

        self.event_sender
            .send_or_log(Event::ProductionRecorded {
                log_id: log.id,
                product_id,
                material_id,
                quantity_used,
                manufactured_qty,
                created_by: actor_id,
                timestamp: log.created_at,
            })
            .await;

        Ok(log)
    }

    /// Undoes the stock effect of a production run. A log can be reversed once;
    /// the log row itself is never touched.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn reverse_production(
        &self,
        log_id: Uuid,
        actor: &Actor,
    ) -> Result<manufacturing_reversal::Model, ServiceError> {
        let actor_id = actor.id;

        let (log, reversal) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let log = manufacturing_log::Entity::find_by_id(log_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Manufacturing log {} not found", log_id))
                    })?;

                let existing = manufacturing_reversal::Entity::find()
                    .filter(manufacturing_reversal::Column::LogId.eq(log_id))
                    .one(txn)
                    .await?;
                if existing.is_some() {
                    return Err(already_reversed(log_id));
                }

                let reversal = manufacturing_reversal::ActiveModel {
                    log_id: Set(log_id),
                    reversed_by: Set(actor_id),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        already_reversed(log_id)
                    } else {
                        ServiceError::from(e)
                    }
                })?;

                // Finished goods must still be on hand; retired rows can still be reversed
                adjust_product(txn, log.product_id, -log.manufactured_qty, false).await?;
                adjust_material(txn, log.material_id, log.quantity_used, false).await?;

                Ok::<_, ServiceError>((log, reversal))
            })
        })
        .await?;

        counter!("ledger.production.reversed", 1);
        info!(
            %log_id,
            reversal_id = %reversal.id,
            quantity_used = %log.quantity_used,
            manufactured_qty = %log.manufactured_qty,
            "production reversed"
        );

        self.event_sender
            .send_or_log(Event::ProductionReversed {
                log_id,
                reversal_id: reversal.id,
                reversed_by: actor_id,
                timestamp: reversal.created_at,
            })
            .await;

        Ok(reversal)
    }

    pub async fn get_log(&self, id: Uuid) -> Result<manufacturing_log::Model, ServiceError> {
        manufacturing_log::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Manufacturing log {} not found", id)))
    }

    /// Logs newest first
    pub async fn list_logs(
        &self,
        filter: LogFilter,
    ) -> Result<Vec<manufacturing_log::Model>, ServiceError> {
        let mut query = manufacturing_log::Entity::find()
            .order_by_desc(manufacturing_log::Column::CreatedAt);
        if let Some(product_id) = filter.product_id {
            query = query.filter(manufacturing_log::Column::ProductId.eq(product_id));
        }
        if let Some(material_id) = filter.material_id {
            query = query.filter(manufacturing_log::Column::MaterialId.eq(material_id));
        }
        Ok(query.all(&*self.db).await?)
    }

    pub async fn is_reversed(&self, log_id: Uuid) -> Result<bool, ServiceError> {
        let reversal = manufacturing_reversal::Entity::find()
            .filter(manufacturing_reversal::Column::LogId.eq(log_id))
            .one(&*self.db)
            .await?;
        Ok(reversal.is_some())
    }
}

fn already_reversed(log_id: Uuid) -> ServiceError {
    ServiceError::Conflict(format!("Manufacturing log {} is already reversed", log_id))
}
