// Stock counters and production
pub mod manufacturing;
pub mod stock_ledger;

// Sales pipeline
pub mod b2b;
pub mod leads;

pub use b2b::{B2bFilter, B2bPatch, B2bService, NewB2bRecord};
pub use leads::{CreateLeadInput, LeadFilter, LeadPatch, LeadService};
pub use manufacturing::{LogFilter, ManufacturingService, ProductionRequest};
pub use stock_ledger::{NewProduct, NewRawMaterial, StockLedgerService};
