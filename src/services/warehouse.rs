use crate::{
    commands::{
        consume_stock_command::{ConsumeStockCommand, ConsumeStockResult},
        delete_supply_command::{DeleteSupplyCommand, DeleteSupplyResult},
        record_supply_command::{RecordSupplyCommand, RecordSupplyResult},
        Command,
    },
    db::DbPool,
    entities::{batch, stock_movement, stock_movement::MovementKind},
    errors::ServiceError,
    events::EventSender,
    queries::{
        inventory_queries::{
            GetBatchesQuery, MovementsForBatchQuery, MovementsForSupplyQuery, PortfolioKpis,
            PortfolioKpisQuery, ProductSummary, ProductSummaryQuery,
        },
        Query,
    },
};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

/// Facade over the ledger commands and aggregation queries.
///
/// Writes to any given product are serialized through a per-product mutex on
/// top of the database transaction, so two concurrent consumptions can never
/// read the same availability snapshot and overdraw it. Reads go straight to
/// the pool and see committed snapshots only.
#[derive(Clone)]
pub struct WarehouseService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    product_locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl WarehouseService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender: Arc::new(event_sender),
            product_locks: Arc::new(DashMap::new()),
        }
    }

    fn lock_for(&self, product_id: i64) -> Arc<Mutex<()>> {
        self.product_locks
            .entry(product_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the write locks for a set of products in ascending id order.
    /// Ordered acquisition keeps multi-product operations deadlock-free.
    async fn lock_products(&self, product_ids: &BTreeSet<i64>) -> Vec<OwnedMutexGuard<()>> {
        let mut guards = Vec::with_capacity(product_ids.len());
        for id in product_ids {
            guards.push(self.lock_for(*id).lock_owned().await);
        }
        guards
    }

    /// Records one delivery with all of its batches. See
    /// [`RecordSupplyCommand`].
    #[instrument(skip(self, command), fields(supplier = %command.supplier))]
    pub async fn record_supply(
        &self,
        command: RecordSupplyCommand,
    ) -> Result<RecordSupplyResult, ServiceError> {
        let product_ids: BTreeSet<i64> = command.lines.iter().map(|l| l.product_id).collect();
        let _guards = self.lock_products(&product_ids).await;
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Debits `quantity` units of a product oldest-batch-first, recording one
    /// movement per batch touched. See [`ConsumeStockCommand`].
    pub async fn consume(
        &self,
        product_id: i64,
        quantity: i32,
        kind: MovementKind,
        comment: Option<String>,
    ) -> Result<ConsumeStockResult, ServiceError> {
        let lock = self.lock_for(product_id);
        let _guard = lock.lock_owned().await;
        ConsumeStockCommand {
            product_id,
            quantity,
            kind,
            comment,
        }
        .execute(self.db_pool.clone(), self.event_sender.clone())
        .await
    }

    /// Deletes a supply with full cascade (batches and movements). See
    /// [`DeleteSupplyCommand`].
    pub async fn delete_supply(&self, supply_id: i64) -> Result<DeleteSupplyResult, ServiceError> {
        let command = DeleteSupplyCommand { supply_id };
        let affected: BTreeSet<i64> = command
            .affected_products(&self.db_pool)
            .await?
            .into_iter()
            .collect();
        let _guards = self.lock_products(&affected).await;
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// All batches of a product, exhausted ones included, FIFO-ordered.
    pub async fn get_batches(&self, product_id: i64) -> Result<Vec<batch::Model>, ServiceError> {
        GetBatchesQuery { product_id }.execute(&self.db_pool).await
    }

    /// Audit trail of one batch, chronological.
    pub async fn movements_for_batch(
        &self,
        batch_id: i64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        MovementsForBatchQuery { batch_id }
            .execute(&self.db_pool)
            .await
    }

    /// Every movement against any batch of a supply, chronological.
    pub async fn movements_for_supply(
        &self,
        supply_id: i64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        MovementsForSupplyQuery { supply_id }
            .execute(&self.db_pool)
            .await
    }

    /// Remaining/supplied/sold/written-off totals and order availability for
    /// one product.
    pub async fn product_summary(&self, product_id: i64) -> Result<ProductSummary, ServiceError> {
        ProductSummaryQuery { product_id }
            .execute(&self.db_pool)
            .await
    }

    /// Portfolio-level KPIs across all products.
    pub async fn portfolio_kpis(&self) -> Result<PortfolioKpis, ServiceError> {
        PortfolioKpisQuery.execute(&self.db_pool).await
    }
}
