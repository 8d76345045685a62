use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Domain events emitted after a ledger transaction commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ProductionRecorded {
        log_id: Uuid,
        product_id: Uuid,
        material_id: Uuid,
        quantity_used: Decimal,
        manufactured_qty: Decimal,
        created_by: Uuid,
        timestamp: DateTime<Utc>,
    },
    ProductionReversed {
        log_id: Uuid,
        reversal_id: Uuid,
        reversed_by: Uuid,
        timestamp: DateTime<Utc>,
    },
    LeadCreated {
        lead_id: Uuid,
        created_by: Uuid,
    },
    LeadUpdated {
        lead_id: Uuid,
        updated_by: Uuid,
    },
    LeadConverted {
        lead_id: Uuid,
        b2b_id: Uuid,
        converted_by: Uuid,
    },
    B2bRecordCreated {
        record_id: Uuid,
        sr_no: i64,
        lead_id: Option<Uuid>,
    },
    B2bRecordUpdated {
        record_id: Uuid,
        amount_pending: Decimal,
    },
}

impl Event {
    /// Short name used in log lines and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            Event::ProductionRecorded { .. } => "production_recorded",
            Event::ProductionReversed { .. } => "production_reversed",
            Event::LeadCreated { .. } => "lead_created",
            Event::LeadUpdated { .. } => "lead_updated",
            Event::LeadConverted { .. } => "lead_converted",
            Event::B2bRecordCreated { .. } => "b2b_record_created",
            Event::B2bRecordUpdated { .. } => "b2b_record_updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    /// The ledger write has already committed by the time events go out.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "dropping domain event");
        }
    }
}

/// Drains the event channel, logging each event until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("ledger.events.processed", 1, "event" => event.name());

        match &event {
            Event::ProductionRecorded {
                log_id,
                product_id,
                material_id,
                quantity_used,
                manufactured_qty,
                ..
            } => {
                info!(
                    %log_id,
                    %product_id,
                    %material_id,
                    %quantity_used,
                    %manufactured_qty,
                    "production recorded"
                );
            }
            Event::ProductionReversed {
                log_id,
                reversal_id,
                ..
            } => {
                info!(%log_id, %reversal_id, "production reversed");
            }
            Event::LeadConverted {
                lead_id,
                b2b_id,
                converted_by,
            } => {
                info!(%lead_id, %b2b_id, %converted_by, "lead converted to B2B record");
            }
            other => {
                info!(event = other.name(), payload = ?other, "domain event");
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_in_order() {
        let (sender, mut rx) = EventSender::channel(4);
        let lead_id = Uuid::new_v4();
        let by = Uuid::new_v4();

        sender
            .send(Event::LeadUpdated {
                lead_id,
                updated_by: by,
            })
            .await
            .unwrap();
        sender
            .send(Event::LeadCreated {
                lead_id,
                created_by: by,
            })
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "lead_updated");
        assert_eq!(rx.recv().await.unwrap().name(), "lead_created");
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (sender, rx) = EventSender::channel(1);
        drop(rx);

        let err = sender
            .send(Event::LeadCreated {
                lead_id: Uuid::new_v4(),
                created_by: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EventError(_)));

        // Must not panic or block
        sender
            .send_or_log(Event::LeadCreated {
                lead_id: Uuid::new_v4(),
                created_by: Uuid::new_v4(),
            })
            .await;
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::B2bRecordCreated {
            record_id: Uuid::nil(),
            sr_no: 7,
            lead_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "b2b_record_created");
        assert_eq!(json["sr_no"], 7);
    }
}
