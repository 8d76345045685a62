use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Product entity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Product category ID
    pub category_id: Option<Uuid>,

    /// Finished-goods stock. Incremented by production runs.
    pub stock_quantity: Decimal,

    /// Product base price
    pub price: Decimal,

    /// Is the product active
    pub is_active: bool,

    /// Bumped on every write; stock adjustments check it to detect a concurrent writer
    pub version: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Product entity relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::manufacturing_log::Entity")]
    ManufacturingLogs,
}

impl Related<super::manufacturing_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ManufacturingLogs.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }

            // Set default values for boolean fields if not set
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }

            if let ActiveValue::NotSet = active_model.version {
                active_model.version = Set(0);
            }

            active_model.created_at = Set(now);
        } else if let ActiveValue::Set(version) | ActiveValue::Unchanged(version) =
            active_model.version
        {
            active_model.version = Set(version + 1);
        }
        active_model.updated_at = Set(now);

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }
        if model.stock_quantity < Decimal::ZERO || model.price < Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: stock_quantity and price cannot be negative".to_string(),
            ));
        }

        Ok(active_model)
    }
}
