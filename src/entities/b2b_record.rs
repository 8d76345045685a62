use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Order progress of a B2B record
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    #[default]
    #[sea_orm(string_value = "OPEN")]
    Open,
    #[sea_orm(string_value = "PARTIAL")]
    Partial,
    #[sea_orm(string_value = "CLOSED")]
    Closed,
}

/// B2B order record for a converted lead.
///
/// `amount_pending` is derived on every save from `total_order_value` and
/// `amount_received`; whatever a caller puts in it is overwritten.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "b2b_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Originating lead; at most one record per lead
    #[sea_orm(unique)]
    pub lead_id: Option<Uuid>,

    /// Serial number, assigned once at creation
    #[sea_orm(unique)]
    pub sr_no: i64,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Client name must be between 1 and 255 characters"
    ))]
    pub client_name: String,

    pub mobile: Option<String>,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,

    pub company: Option<String>,

    pub order_date: Option<NaiveDate>,

    pub order_details: Option<String>,

    pub total_order_value: Decimal,

    pub amount_received: Decimal,

    pub amount_pending: Decimal,

    pub last_receipt_date: Option<NaiveDate>,

    pub order_status: OrderStatus,

    pub converted_by: Option<Uuid>,

    pub created_by: Uuid,

    pub additional_remarks: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// `total_order_value - amount_received`. Negative when the client has overpaid.
pub fn pending_amount(total_order_value: Decimal, amount_received: Decimal) -> Decimal {
    total_order_value - amount_received
}

fn written_value(value: &ActiveValue<Decimal>) -> Option<Decimal> {
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(*v),
        ActiveValue::NotSet => None,
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lead::Entity",
        from = "Column::LeadId",
        to = "super::lead::Column::Id"
    )]
    Lead,
}

impl Related<super::lead::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lead.def()
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
            if let ActiveValue::NotSet = active_model.total_order_value {
                active_model.total_order_value = Set(Decimal::ZERO);
            }
            if let ActiveValue::NotSet = active_model.amount_received {
                active_model.amount_received = Set(Decimal::ZERO);
            }
            if let ActiveValue::NotSet = active_model.order_status {
                active_model.order_status = Set(OrderStatus::Open);
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        // Partial active models cannot be trusted to derive the pending amount
        let (total, received) = match (
            written_value(&active_model.total_order_value),
            written_value(&active_model.amount_received),
        ) {
            (Some(total), Some(received)) => (total, received),
            _ => {
                return Err(DbErr::Custom(
                    "amount_pending requires both total_order_value and amount_received; \
                     update from a loaded record"
                        .to_string(),
                ))
            }
        };
        if total < Decimal::ZERO || received < Decimal::ZERO {
            return Err(DbErr::Custom(
                "Validation error: order amounts cannot be negative".to_string(),
            ));
        }
        active_model.amount_pending = Set(pending_amount(total, received));

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
