use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Raw material entity: a consumable manufacturing input and its on-hand quantity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "raw_materials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Material name, unique across the store
    #[sea_orm(unique)]
    #[validate(length(
        min = 1,
        max = 255,
        message = "Material name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Unit of measure (kg, litre, piece, ...)
    #[validate(length(min = 1, max = 32, message = "Unit must be between 1 and 32 characters"))]
    pub unit: String,

    /// On-hand quantity. Only the manufacturing ledger writes this column.
    pub current_quantity: Decimal,

    pub is_active: bool,

    /// Bumped on every write; stock adjustments check it to detect a concurrent writer
    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

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
        if model.current_quantity < Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: current_quantity cannot be negative".to_string(),
            ));
        }

        Ok(active_model)
    }
}
