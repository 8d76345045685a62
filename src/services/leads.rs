use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    db::with_transaction,
    entities::lead::{self, LeadRemarks},
    errors::ServiceError,
    events::{Event, EventSender},
    services::b2b::ensure_for_lead,
};

const DEFAULT_LEAD_STATUS: &str = "NEW";

fn default_lead_status() -> String {
    DEFAULT_LEAD_STATUS.to_string()
}

/// Fields for a new lead
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLeadInput {
    #[validate(length(min = 1, max = 255, message = "Full name must be between 1 and 255 characters"))]
    pub full_name: String,
    #[validate(length(max = 32, message = "Phone cannot exceed 32 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    pub company: Option<String>,
    #[serde(default = "default_lead_status")]
    #[validate(length(min = 1, max = 64, message = "Lead status must be between 1 and 64 characters"))]
    pub lead_status: String,
    pub assigned_to: Option<Uuid>,
    /// Optional first remark
    pub remark: Option<String>,
}

/// Partial lead update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LeadPatch {
    #[validate(length(min = 1, max = 255, message = "Full name must be between 1 and 255 characters"))]
    pub full_name: Option<String>,
    #[validate(length(max = 32, message = "Phone cannot exceed 32 characters"))]
    pub phone: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    pub company: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Lead status must be between 1 and 64 characters"))]
    pub lead_status: Option<String>,
    pub assigned_to: Option<Uuid>,
    /// Appended to the remark history when non-blank
    pub remarks: Option<String>,
    pub converted: Option<bool>,
    pub converted_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadFilter {
    pub lead_status: Option<String>,
    pub converted: Option<bool>,
    pub assigned_to: Option<Uuid>,
}

impl LeadFilter {
    /// Non-managers only ever see leads assigned to them.
    pub fn scoped_to(mut self, actor: &Actor) -> Self {
        if !actor.is_manager_or_above() {
            self.assigned_to = Some(actor.id);
        }
        self
    }
}

/// Lead pipeline and the at-most-once conversion into a B2B record
#[derive(Clone)]
pub struct LeadService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl LeadService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input, actor), fields(actor_id = %actor.id))]
    pub async fn create_lead(
        &self,
        input: CreateLeadInput,
        actor: &Actor,
    ) -> Result<lead::Model, ServiceError> {
        input.validate()?;

        let assigned_to = if actor.is_manager_or_above() {
            input.assigned_to
        } else {
            match input.assigned_to {
                Some(other) if other != actor.id => {
                    return Err(ServiceError::Forbidden(
                        "Only managers can assign leads to other users".to_string(),
                    ))
                }
                _ => Some(actor.id),
            }
        };

        let actor_id = actor.id;
        let created = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let mut remarks = LeadRemarks::default();
                if let Some(comment) = input.remark.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                    remarks.push(comment, actor_id, Utc::now());
                }

                let lead = lead::ActiveModel {
                    full_name: Set(input.full_name.trim().to_string()),
                    phone: Set(input.phone),
                    email: Set(input.email),
                    company: Set(input.company),
                    lead_status: Set(input.lead_status),
                    assigned_to: Set(assigned_to),
                    converted: Set(false),
                    converted_by: Set(None),
                    converted_date: Set(None),
                    remarks: Set(remarks),
                    created_by: Set(actor_id),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                Ok::<_, ServiceError>(lead)
            })
        })
        .await?;

        counter!("ledger.leads.created", 1);
        info!(lead_id = %created.id, "lead created");
        self.event_sender
            .send_or_log(Event::LeadCreated {
                lead_id: created.id,
                created_by: actor_id,
            })
            .await;

        Ok(created)
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<lead::Model, ServiceError> {
        lead::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Lead {} not found", id)))
    }

    /// Leads matching `filter`, newest first
    pub async fn list_leads(&self, filter: LeadFilter) -> Result<Vec<lead::Model>, ServiceError> {
        let mut condition = Condition::all();
        if let Some(status) = filter.lead_status {
            condition = condition.add(lead::Column::LeadStatus.eq(status));
        }
        if let Some(converted) = filter.converted {
            condition = condition.add(lead::Column::Converted.eq(converted));
        }
        if let Some(assigned_to) = filter.assigned_to {
            condition = condition.add(lead::Column::AssignedTo.eq(assigned_to));
        }

        Ok(lead::Entity::find()
            .filter(condition)
            .order_by_desc(lead::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Applies a patch to a lead and, when the lead ends up converted, makes
    /// sure exactly one B2B record exists for it.
    ///
    /// Un-converting clears the conversion fields but leaves any B2B record
    /// in place; converting again reuses it.
    #[instrument(skip(self, patch, actor), fields(actor_id = %actor.id))]
    pub async fn update_lead(
        &self,
        lead_id: Uuid,
        patch: LeadPatch,
        actor: &Actor,
    ) -> Result<lead::Model, ServiceError> {
        patch.validate()?;

        let actor = actor.clone();
        let actor_id = actor.id;
        let (updated, created_b2b) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = lead::Entity::find_by_id(lead_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Lead {} not found", lead_id)))?;

                let is_manager = actor.is_manager_or_above();
                if !is_manager && !existing.is_assigned_to(actor.id) {
                    return Err(ServiceError::Forbidden(format!(
                        "Lead {} is not assigned to you",
                        lead_id
                    )));
                }
                if let Some(new_assignee) = patch.assigned_to {
                    if existing.assigned_to != Some(new_assignee) && !is_manager {
                        return Err(ServiceError::Forbidden(
                            "Only managers can reassign leads".to_string(),
                        ));
                    }
                }

                let now = Utc::now();
                let mut remarks = existing.remarks.clone();
                let mut lead: lead::ActiveModel = existing.into();

                if let Some(full_name) = patch.full_name {
                    lead.full_name = Set(full_name.trim().to_string());
                }
                if let Some(phone) = patch.phone {
                    lead.phone = Set(Some(phone));
                }
                if let Some(email) = patch.email {
                    lead.email = Set(Some(email));
                }
                if let Some(company) = patch.company {
                    lead.company = Set(Some(company));
                }
                if let Some(status) = patch.lead_status {
                    lead.lead_status = Set(status);
                }
                if let Some(assignee) = patch.assigned_to {
                    lead.assigned_to = Set(Some(assignee));
                }

                if let Some(comment) = patch.remarks.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                    remarks.push(comment, actor.id, now);
                    lead.remarks = Set(remarks);
                }

                match patch.converted {
                    Some(true) => {
                        lead.converted = Set(true);
                        lead.converted_by = Set(Some(patch.converted_by.unwrap_or(actor.id)));
                        lead.converted_date = Set(Some(now));
                    }
                    Some(false) => {
                        lead.converted = Set(false);
                        lead.converted_by = Set(None);
                        lead.converted_date = Set(None);
                    }
                    None => {}
                }

                let lead = lead.update(txn).await?;

                let created_b2b = if lead.converted {
                    let (record, created) = ensure_for_lead(txn, &lead, actor.id).await?;
                    created.then_some(record)
                } else {
                    None
                };

                Ok::<_, ServiceError>((lead, created_b2b))
            })
        })
        .await?;

        counter!("ledger.leads.updated", 1);
        info!(lead_id = %updated.id, converted = updated.converted, "lead updated");
        self.event_sender
            .send_or_log(Event::LeadUpdated {
                lead_id: updated.id,
                updated_by: actor_id,
            })
            .await;

        if let Some(record) = created_b2b {
            counter!("ledger.leads.converted", 1);
            info!(lead_id = %updated.id, b2b_id = %record.id, sr_no = record.sr_no, "lead converted");
            self.event_sender
                .send_or_log(Event::LeadConverted {
                    lead_id: updated.id,
                    b2b_id: record.id,
                    converted_by: updated.converted_by.unwrap_or(actor_id),
                })
                .await;
            self.event_sender
                .send_or_log(Event::B2bRecordCreated {
                    record_id: record.id,
                    sr_no: record.sr_no,
                    lead_id: record.lead_id,
                })
                .await;
        }

        Ok(updated)
    }
}
