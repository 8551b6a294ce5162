#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tempfile::TempDir;
use warehouse_engine::{
    db::{self, DbConfig, DbPool},
    entities::{batch, product, stock_movement},
    events::{event_channel, spawn_event_logger},
    RecordSupplyCommand, SupplyLineInput, WarehouseService,
};

/// Installs a test subscriber once so `RUST_LOG` controls engine output
/// during test runs.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Helper harness wiring a `WarehouseService` to a throwaway SQLite database.
pub struct TestWarehouse {
    pub service: WarehouseService,
    pub db: Arc<DbPool>,
    _event_task: Option<tokio::task::JoinHandle<()>>,
    _dir: TempDir,
}

impl TestWarehouse {
    /// Construct a warehouse with fresh database state.
    pub async fn new() -> Self {
        Self::with_event_logging(true).await
    }

    /// Harness whose event receiver is already gone, for exercising the
    /// post-commit notification failure path.
    pub async fn with_closed_event_channel() -> Self {
        Self::with_event_logging(false).await
    }

    async fn with_event_logging(spawn_logger: bool) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("warehouse_test.db");
        let config = DbConfig {
            url: format!("sqlite://{}?mode=rwc", db_path.display()),
            // One pooled connection keeps SQLite happy under concurrent
            // writers; the engine's own locking does the serialization.
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };

        let pool = db::establish_connection_with_config(&config)
            .await
            .expect("connect test database");
        db::create_schema(&pool).await.expect("create schema");

        let (sender, receiver) = event_channel(64);
        let event_task = if spawn_logger {
            Some(spawn_event_logger(receiver))
        } else {
            drop(receiver);
            None
        };

        let db = Arc::new(pool);
        Self {
            service: WarehouseService::new(db.clone(), sender),
            db,
            _event_task: event_task,
            _dir: dir,
        }
    }

    pub async fn create_product(&self, name: &str, category: &str, min_order_quantity: i32) -> i64 {
        let saved = product::ActiveModel {
            name: Set(name.to_string()),
            category: Set(category.to_string()),
            min_order_quantity: Set(min_order_quantity),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await
        .expect("insert product");
        saved.id
    }

    /// Records a one-line supply and returns `(supply_id, batch_id)`.
    pub async fn record_single_batch(
        &self,
        product_id: i64,
        delivered_on: NaiveDate,
        quantity: i32,
        unit_price: Decimal,
    ) -> (i64, i64) {
        let result = self
            .service
            .record_supply(RecordSupplyCommand {
                supplier: "Test Supplier".to_string(),
                delivered_on,
                delivery_price: None,
                comment: None,
                lines: vec![SupplyLineInput {
                    product_id,
                    quantity,
                    unit_price,
                }],
            })
            .await
            .expect("record supply");
        (result.supply_id, result.batch_ids[0])
    }

    /// Full ledger + movement log snapshot, for before/after comparisons.
    pub async fn snapshot(&self) -> (Vec<batch::Model>, Vec<stock_movement::Model>) {
        use sea_orm::{EntityTrait, QueryOrder};
        let batches = batch::Entity::find()
            .order_by_asc(batch::Column::Id)
            .all(self.db.as_ref())
            .await
            .expect("fetch batches");
        let movements = stock_movement::Entity::find()
            .order_by_asc(stock_movement::Column::Id)
            .all(self.db.as_ref())
            .await
            .expect("fetch movements");
        (batches, movements)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn price(units: i64) -> Decimal {
    Decimal::from(units)
}
