use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::Actor,
    db::{is_unique_violation, with_transaction},
    entities::{
        b2b_record::{self, OrderStatus},
        lead,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Upper bound on serial-number allocation retries under contention
const SR_NO_ATTEMPTS: usize = 5;

/// Fields accepted when creating a B2B record.
///
/// There is deliberately no `amount_pending` here; a JSON body carrying one
/// deserializes fine and the value is dropped.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NewB2bRecord {
    pub lead_id: Option<Uuid>,
    #[validate(length(min = 1, max = 255, message = "Client name must be between 1 and 255 characters"))]
    pub client_name: String,
    pub mobile: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    pub company: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub order_details: Option<String>,
    #[serde(default)]
    pub total_order_value: Decimal,
    #[serde(default)]
    pub amount_received: Decimal,
    pub last_receipt_date: Option<NaiveDate>,
    #[serde(default)]
    pub order_status: OrderStatus,
    pub converted_by: Option<Uuid>,
    pub additional_remarks: Option<String>,
}

impl NewB2bRecord {
    /// Seeds an empty OPEN record from a converted lead's contact details
    pub fn from_lead(lead: &lead::Model) -> Self {
        Self {
            lead_id: Some(lead.id),
            client_name: lead.full_name.clone(),
            mobile: lead.phone.clone(),
            email: lead.email.clone(),
            company: lead.company.clone(),
            order_status: OrderStatus::Open,
            converted_by: lead.converted_by,
            ..Default::default()
        }
    }

    fn into_active_model(self, sr_no: i64, created_by: Uuid) -> b2b_record::ActiveModel {
        let last_receipt_date = match self.last_receipt_date {
            Some(date) => Some(date),
            None if self.amount_received > Decimal::ZERO => Some(Utc::now().date_naive()),
            None => None,
        };

        b2b_record::ActiveModel {
            lead_id: Set(self.lead_id),
            sr_no: Set(sr_no),
            client_name: Set(self.client_name),
            mobile: Set(self.mobile),
            email: Set(self.email),
            company: Set(self.company),
            order_date: Set(self.order_date),
            order_details: Set(self.order_details),
            total_order_value: Set(self.total_order_value),
            amount_received: Set(self.amount_received),
            last_receipt_date: Set(last_receipt_date),
            order_status: Set(self.order_status),
            converted_by: Set(self.converted_by),
            created_by: Set(created_by),
            additional_remarks: Set(self.additional_remarks),
            ..Default::default()
        }
    }
}

/// Partial update of a B2B record. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct B2bPatch {
    #[validate(length(min = 1, max = 255, message = "Client name must be between 1 and 255 characters"))]
    pub client_name: Option<String>,
    pub mobile: Option<String>,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
    pub company: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub order_details: Option<String>,
    pub total_order_value: Option<Decimal>,
    pub amount_received: Option<Decimal>,
    pub last_receipt_date: Option<NaiveDate>,
    pub order_status: Option<OrderStatus>,
    pub additional_remarks: Option<String>,
}

/// Listing filters. Every field narrows the result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct B2bFilter {
    pub lead_id: Option<Uuid>,
    pub order_status: Option<OrderStatus>,
    pub search: Option<String>,
    pub order_date_from: Option<NaiveDate>,
    pub order_date_to: Option<NaiveDate>,
    pub converted_by: Option<Uuid>,
}

impl B2bFilter {
    /// Non-managers only ever see the records they converted.
    pub fn scoped_to(mut self, actor: &Actor) -> Self {
        if !actor.is_manager_or_above() {
            self.converted_by = Some(actor.id);
        }
        self
    }

    fn condition(&self) -> Condition {
        let mut condition = Condition::all();
        if let Some(lead_id) = self.lead_id {
            condition = condition.add(b2b_record::Column::LeadId.eq(lead_id));
        }
        if let Some(status) = self.order_status {
            condition = condition.add(b2b_record::Column::OrderStatus.eq(status));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            condition = condition.add(
                Condition::any()
                    .add(b2b_record::Column::ClientName.contains(search))
                    .add(b2b_record::Column::Mobile.contains(search)),
            );
        }
        if let Some(from) = self.order_date_from {
            condition = condition.add(b2b_record::Column::OrderDate.gte(from));
        }
        if let Some(to) = self.order_date_to {
            condition = condition.add(b2b_record::Column::OrderDate.lte(to));
        }
        if let Some(converted_by) = self.converted_by {
            condition = condition.add(b2b_record::Column::ConvertedBy.eq(converted_by));
        }
        condition
    }
}

fn check_amounts(total: Option<Decimal>, received: Option<Decimal>) -> Result<(), ServiceError> {
    if total.is_some_and(|v| v < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "total_order_value cannot be negative".to_string(),
        ));
    }
    if received.is_some_and(|v| v < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "amount_received cannot be negative".to_string(),
        ));
    }
    Ok(())
}

async fn next_sr_no<C: ConnectionTrait>(conn: &C) -> Result<i64, ServiceError> {
    let last = b2b_record::Entity::find()
        .order_by_desc(b2b_record::Column::SrNo)
        .one(conn)
        .await?;
    Ok(last.map_or(1, |record| record.sr_no + 1))
}

pub(crate) async fn find_by_lead<C: ConnectionTrait>(
    conn: &C,
    lead_id: Uuid,
) -> Result<Option<b2b_record::Model>, ServiceError> {
    Ok(b2b_record::Entity::find()
        .filter(b2b_record::Column::LeadId.eq(lead_id))
        .one(conn)
        .await?)
}

/// Inserts a record with the next free serial number.
///
/// Each attempt runs in its own savepoint so a unique violation leaves the
/// surrounding transaction usable. A violation on `lead_id` means the lead
/// already has a record and ends in `Conflict`; one on `sr_no` means a
/// concurrent writer took the number, and the insert is retried.
pub(crate) async fn insert_record<C>(
    conn: &C,
    record: NewB2bRecord,
    created_by: Uuid,
) -> Result<b2b_record::Model, ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    for attempt in 1..=SR_NO_ATTEMPTS {
        let savepoint = conn.begin().await?;
        let sr_no = next_sr_no(&savepoint).await?;

        match record
            .clone()
            .into_active_model(sr_no, created_by)
            .insert(&savepoint)
            .await
        {
            Ok(model) => {
                savepoint.commit().await?;
                return Ok(model);
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                if let Some(lead_id) = record.lead_id {
                    if find_by_lead(conn, lead_id).await?.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "Lead {} already has a B2B record",
                            lead_id
                        )));
                    }
                }
                counter!("ledger.b2b.sr_no_retries", 1);
                warn!(attempt, sr_no, "serial number taken concurrently, retrying");
            }
            Err(err) => {
                savepoint.rollback().await?;
                return Err(err.into());
            }
        }
    }

    Err(ServiceError::Conflict(
        "Could not allocate a B2B serial number, try again".to_string(),
    ))
}

/// Returns the lead's B2B record, creating it if this is the first
/// conversion. The bool is true when this call created the record.
pub(crate) async fn ensure_for_lead<C>(
    conn: &C,
    lead: &lead::Model,
    created_by: Uuid,
) -> Result<(b2b_record::Model, bool), ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = find_by_lead(conn, lead.id).await? {
        return Ok((existing, false));
    }

    match insert_record(conn, NewB2bRecord::from_lead(lead), created_by).await {
        Ok(record) => Ok((record, true)),
        // Lost the race to a concurrent conversion; theirs is the record
        Err(ServiceError::Conflict(message)) => match find_by_lead(conn, lead.id).await? {
            Some(existing) => Ok((existing, false)),
            None => Err(ServiceError::Conflict(message)),
        },
        Err(err) => Err(err),
    }
}

/// B2B order records and their derived pending amount
#[derive(Clone)]
pub struct B2bService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl B2bService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates a record directly, without going through lead conversion
    #[instrument(skip(self, record, actor), fields(actor_id = %actor.id))]
    pub async fn create(
        &self,
        record: NewB2bRecord,
        actor: &Actor,
    ) -> Result<b2b_record::Model, ServiceError> {
        record.validate()?;
        check_amounts(Some(record.total_order_value), Some(record.amount_received))?;

        let created_by = actor.id;
        let created = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                if let Some(lead_id) = record.lead_id {
                    lead::Entity::find_by_id(lead_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound(format!("Lead {} not found", lead_id)))?;
                    if find_by_lead(txn, lead_id).await?.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "Lead {} already has a B2B record",
                            lead_id
                        )));
                    }
                }
                insert_record(txn, record, created_by).await
            })
        })
        .await?;

        counter!("ledger.b2b.created", 1);
        info!(record_id = %created.id, sr_no = created.sr_no, "B2B record created");
        self.event_sender
            .send_or_log(Event::B2bRecordCreated {
                record_id: created.id,
                sr_no: created.sr_no,
                lead_id: created.lead_id,
            })
            .await;

        Ok(created)
    }

    /// Applies a partial update. `amount_pending` is recomputed from the
    /// written amounts, falling back to the stored ones.
    #[instrument(skip(self, patch, actor), fields(actor_id = %actor.id))]
    pub async fn update(
        &self,
        id: Uuid,
        patch: B2bPatch,
        actor: &Actor,
    ) -> Result<b2b_record::Model, ServiceError> {
        patch.validate()?;
        check_amounts(patch.total_order_value, patch.amount_received)?;

        let actor = actor.clone();
        let updated = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = b2b_record::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("B2B record {} not found", id)))?;

                if !actor.is_manager_or_above() && existing.converted_by != Some(actor.id) {
                    return Err(ServiceError::Forbidden(format!(
                        "B2B record {} belongs to another user",
                        id
                    )));
                }

                let received_changed = patch
                    .amount_received
                    .is_some_and(|received| received != existing.amount_received);

                let mut record: b2b_record::ActiveModel = existing.into();
                if let Some(client_name) = patch.client_name {
                    record.client_name = Set(client_name);
                }
                if let Some(mobile) = patch.mobile {
                    record.mobile = Set(Some(mobile));
                }
                if let Some(email) = patch.email {
                    record.email = Set(Some(email));
                }
                if let Some(company) = patch.company {
                    record.company = Set(Some(company));
                }
                if let Some(order_date) = patch.order_date {
                    record.order_date = Set(Some(order_date));
                }
                if let Some(order_details) = patch.order_details {
                    record.order_details = Set(Some(order_details));
                }
                if let Some(total) = patch.total_order_value {
                    record.total_order_value = Set(total);
                }
                if let Some(received) = patch.amount_received {
                    record.amount_received = Set(received);
                }
                match patch.last_receipt_date {
                    Some(date) => record.last_receipt_date = Set(Some(date)),
                    None if received_changed => {
                        record.last_receipt_date = Set(Some(Utc::now().date_naive()))
                    }
                    None => {}
                }
                if let Some(status) = patch.order_status {
                    record.order_status = Set(status);
                }
                if let Some(remarks) = patch.additional_remarks {
                    record.additional_remarks = Set(Some(remarks));
                }

                Ok::<_, ServiceError>(record.update(txn).await?)
            })
        })
        .await?;

        counter!("ledger.b2b.updated", 1);
        info!(
            record_id = %updated.id,
            amount_pending = %updated.amount_pending,
            "B2B record updated"
        );
        self.event_sender
            .send_or_log(Event::B2bRecordUpdated {
                record_id: updated.id,
                amount_pending: updated.amount_pending,
            })
            .await;

        Ok(updated)
    }

    pub async fn get(&self, id: Uuid) -> Result<b2b_record::Model, ServiceError> {
        b2b_record::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("B2B record {} not found", id)))
    }

    pub async fn get_for_lead(&self, lead_id: Uuid) -> Result<Option<b2b_record::Model>, ServiceError> {
        find_by_lead(&*self.db, lead_id).await
    }

    /// Records matching `filter`, in serial-number order
    pub async fn list(&self, filter: B2bFilter) -> Result<Vec<b2b_record::Model>, ServiceError> {
        Ok(b2b_record::Entity::find()
            .filter(filter.condition())
            .order_by_asc(b2b_record::Column::SrNo)
            .all(&*self.db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    async fn seed_lead(db: &DatabaseConnection, name: &str) -> lead::Model {
        lead::ActiveModel {
            full_name: Set(name.to_string()),
            phone: Set(Some("5550142".to_string())),
            email: Set(None),
            company: Set(None),
            lead_status: Set("NEW".to_string()),
            assigned_to: Set(None),
            converted: Set(true),
            converted_by: Set(None),
            converted_date: Set(None),
            remarks: Set(Default::default()),
            created_by: Set(Uuid::new_v4()),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[test]
    fn scoped_filter_forces_owner_for_staff() {
        let staff = Actor::staff(Uuid::new_v4());
        let other = Uuid::new_v4();
        let filter = B2bFilter {
            converted_by: Some(other),
            ..Default::default()
        }
        .scoped_to(&staff);
        assert_eq!(filter.converted_by, Some(staff.id));
    }

    #[test]
    fn scoped_filter_leaves_managers_alone() {
        let manager = Actor::manager(Uuid::new_v4());
        let filter = B2bFilter::default().scoped_to(&manager);
        assert_eq!(filter.converted_by, None);
    }

    #[test]
    fn new_record_ignores_pending_in_json() {
        let record: NewB2bRecord = serde_json::from_value(serde_json::json!({
            "client_name": "Acme",
            "total_order_value": "1000",
            "amount_received": "400",
            "amount_pending": "5"
        }))
        .unwrap();
        assert_eq!(record.total_order_value, dec!(1000));
        assert_eq!(record.amount_received, dec!(400));
        assert_eq!(record.order_status, OrderStatus::Open);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(check_amounts(Some(dec!(-1)), None).is_err());
        assert!(check_amounts(None, Some(dec!(-0.01))).is_err());
        assert!(check_amounts(Some(dec!(100)), Some(dec!(150))).is_ok());
    }

    #[test]
    fn receipt_date_stamped_when_money_arrives_on_create() {
        let record = NewB2bRecord {
            client_name: "Acme".into(),
            amount_received: dec!(10),
            ..Default::default()
        };
        let active = record.into_active_model(1, Uuid::new_v4());
        assert_eq!(
            active.last_receipt_date,
            Set(Some(Utc::now().date_naive()))
        );
    }

    #[tokio::test]
    async fn second_insert_for_a_lead_conflicts_and_keeps_the_transaction_usable() {
        let db = test_pool().await;
        let lead = seed_lead(&db, "Ines Duarte").await;
        let creator = Uuid::new_v4();

        let (first, second, ensured) = with_transaction(&db, move |txn| {
            Box::pin(async move {
                let first = insert_record(txn, NewB2bRecord::from_lead(&lead), creator).await?;
                let second = insert_record(txn, NewB2bRecord::from_lead(&lead), creator).await;
                // The failed insert only rolled back its own savepoint
                let ensured = ensure_for_lead(txn, &lead, creator).await?;
                Ok::<_, ServiceError>((first, second, ensured))
            })
        })
        .await
        .unwrap();

        assert_matches!(second, Err(ServiceError::Conflict(message)) if message.contains("already has"));
        let (existing, created) = ensured;
        assert_eq!(existing.id, first.id);
        assert!(!created);

        let stored = b2b_record::Entity::find().all(&db).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sr_no, 1);
    }

    #[tokio::test]
    async fn ensure_for_lead_creates_once() {
        let db = test_pool().await;
        let lead = seed_lead(&db, "Tomas Ruiz").await;
        let creator = Uuid::new_v4();

        let (created, was_created) = ensure_for_lead(&db, &lead, creator).await.unwrap();
        assert!(was_created);
        assert_eq!(created.lead_id, Some(lead.id));
        assert_eq!(created.client_name, "Tomas Ruiz");
        assert_eq!(created.mobile.as_deref(), Some("5550142"));
        assert_eq!(created.created_by, creator);

        let (again, was_created) = ensure_for_lead(&db, &lead, Uuid::new_v4()).await.unwrap();
        assert!(!was_created);
        assert_eq!(again.id, created.id);
        assert_eq!(again.created_by, creator);
    }

    #[tokio::test]
    async fn serials_continue_across_direct_and_lead_records() {
        let db = test_pool().await;
        let lead = seed_lead(&db, "Mei Chen").await;
        let creator = Uuid::new_v4();

        let direct = insert_record(
            &db,
            NewB2bRecord {
                client_name: "Walk-in".into(),
                ..Default::default()
            },
            creator,
        )
        .await
        .unwrap();
        let (converted, _) = ensure_for_lead(&db, &lead, creator).await.unwrap();
        let another = insert_record(
            &db,
            NewB2bRecord {
                client_name: "Walk-in again".into(),
                ..Default::default()
            },
            creator,
        )
        .await
        .unwrap();

        assert_eq!(
            (direct.sr_no, converted.sr_no, another.sr_no),
            (1, 2, 3)
        );
        assert_eq!(next_sr_no(&db).await.unwrap(), 4);
    }
}
