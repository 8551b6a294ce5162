//! Warehouse Engine
//!
//! FIFO batch-inventory core: delivery batches ("supplies") of perishable
//! goods are recorded into a ledger, consumed strictly oldest-first as sales
//! and write-offs occur, and aggregated into per-product summaries and
//! portfolio KPIs. The engine is a library meant to be embedded in a service
//! that exposes its own API surface; it defines no wire protocol of its own.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod queries;
pub mod services;

pub use commands::consume_stock_command::{BatchDebit, ConsumeStockCommand, ConsumeStockResult};
pub use commands::delete_supply_command::{DeleteSupplyCommand, DeleteSupplyResult};
pub use commands::record_supply_command::{
    RecordSupplyCommand, RecordSupplyResult, SupplyLineInput,
};
pub use commands::Command;
pub use config::EngineConfig;
pub use db::{establish_connection, establish_connection_with_config, DbConfig, DbPool};
pub use entities::stock_movement::MovementKind;
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use queries::inventory_queries::{
    PortfolioKpis, ProductSummary, LOW_STOCK_THRESHOLD, REORDER_THRESHOLD,
};
pub use services::warehouse::WarehouseService;
