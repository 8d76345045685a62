pub mod b2b;
pub mod leads;
pub mod manufacturing;
pub mod stock;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{B2bService, LeadService, ManufacturingService, StockLedgerService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub stock: Arc<StockLedgerService>,
    pub manufacturing: Arc<ManufacturingService>,
    pub leads: Arc<LeadService>,
    pub b2b: Arc<B2bService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            stock: Arc::new(StockLedgerService::new(db_pool.clone())),
            manufacturing: Arc::new(ManufacturingService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            leads: Arc::new(LeadService::new(db_pool.clone(), event_sender.clone())),
            b2b: Arc::new(B2bService::new(db_pool, event_sender)),
        }
    }
}
