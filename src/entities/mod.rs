//! SeaORM entities backing the production and conversion ledger

pub mod b2b_record;
pub mod lead;
pub mod manufacturing_log;
pub mod manufacturing_reversal;
pub mod product;
pub mod raw_material;
