use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait, FromJsonQueryResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A single remark left on a lead
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRemark {
    pub comment: String,
    pub by: Uuid,
    pub date: DateTime<Utc>,
}

/// Remarks in insertion order, stored as a JSON array
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct LeadRemarks(pub Vec<LeadRemark>);

impl LeadRemarks {
    pub fn push(&mut self, comment: impl Into<String>, by: Uuid, date: DateTime<Utc>) {
        self.0.push(LeadRemark {
            comment: comment.into(),
            by,
            date,
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeadRemark> {
        self.0.iter()
    }
}

/// Lead entity: a prospective client tracked through the sales pipeline
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Full name must be between 1 and 255 characters"
    ))]
    pub full_name: String,

    #[validate(length(max = 32, message = "Phone cannot exceed 32 characters"))]
    pub phone: Option<String>,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,

    pub company: Option<String>,

    #[validate(length(min = 1, max = 64, message = "Lead status must be between 1 and 64 characters"))]
    pub lead_status: String,

    pub assigned_to: Option<Uuid>,

    pub converted: bool,

    pub converted_by: Option<Uuid>,

    pub converted_date: Option<DateTime<Utc>>,

    #[sea_orm(column_type = "Json")]
    pub remarks: LeadRemarks,

    pub created_by: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Whether `user_id` is the lead's current assignee.
    pub fn is_assigned_to(&self, user_id: Uuid) -> bool {
        self.assigned_to == Some(user_id)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::b2b_record::Entity")]
    B2bRecord,
}

impl Related<super::b2b_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::B2bRecord.def()
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
            if let ActiveValue::NotSet = active_model.converted {
                active_model.converted = Set(false);
            }
            if let ActiveValue::NotSet = active_model.remarks {
                active_model.remarks = Set(LeadRemarks::default());
            }
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
