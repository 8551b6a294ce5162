//! sea-orm entities backing the batch ledger and movement log.

pub mod batch;
pub mod product;
pub mod stock_movement;
pub mod supply;
