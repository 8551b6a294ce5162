use crate::{
    entities::{
        batch, product,
        stock_movement::{self, MovementKind},
        supply,
    },
    errors::ServiceError,
    queries::Query,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

/// Products with `0 < remaining < 20` count as low stock. Fixed policy, not
/// configuration; callers needing a different threshold wrap the aggregator.
pub const LOW_STOCK_THRESHOLD: i64 = 20;
/// Products with `0 < remaining < 30` count as needing reorder.
pub const REORDER_THRESHOLD: i64 = 30;

fn map_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

/// All batches of a product in FIFO order, exhausted ones included, for
/// audit display.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetBatchesQuery {
    pub product_id: i64,
}

#[async_trait]
impl Query for GetBatchesQuery {
    type Result = Vec<batch::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        product::Entity::find_by_id(self.product_id)
            .one(db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", self.product_id))
            })?;

        batch::Entity::find()
            .filter(batch::Column::ProductId.eq(self.product_id))
            .order_by_asc(batch::Column::DeliveredOn)
            .order_by_asc(batch::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

/// Chronological movement history of one batch.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovementsForBatchQuery {
    pub batch_id: i64,
}

#[async_trait]
impl Query for MovementsForBatchQuery {
    type Result = Vec<stock_movement::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        batch::Entity::find_by_id(self.batch_id)
            .one(db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", self.batch_id)))?;

        stock_movement::Entity::find()
            .filter(stock_movement::Column::BatchId.eq(self.batch_id))
            .order_by_asc(stock_movement::Column::OccurredAt)
            .order_by_asc(stock_movement::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

/// Every movement recorded against any batch of a supply, chronological.
#[derive(Debug, Serialize, Deserialize)]
pub struct MovementsForSupplyQuery {
    pub supply_id: i64,
}

#[async_trait]
impl Query for MovementsForSupplyQuery {
    type Result = Vec<stock_movement::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        supply::Entity::find_by_id(self.supply_id)
            .one(db_pool)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supply {} not found", self.supply_id))
            })?;

        let batch_ids: Vec<i64> = batch::Entity::find()
            .filter(batch::Column::SupplyId.eq(self.supply_id))
            .all(db_pool)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();

        if batch_ids.is_empty() {
            return Ok(Vec::new());
        }

        stock_movement::Entity::find()
            .filter(stock_movement::Column::BatchId.is_in(batch_ids))
            .order_by_asc(stock_movement::Column::OccurredAt)
            .order_by_asc(stock_movement::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

/// Per-product aggregate derived from the ledger and the movement log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: i64,
    pub total_remaining: i64,
    pub total_supplied: i64,
    pub total_sold: i64,
    pub total_written_off: i64,
    /// `total_remaining / min_order_quantity`, or 0 when no minimum order
    /// quantity is configured (such products are not orderable).
    pub available_orders: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductSummaryQuery {
    pub product_id: i64,
}

#[async_trait]
impl Query for ProductSummaryQuery {
    type Result = ProductSummary;

    #[instrument(skip(self, db_pool), fields(product_id = self.product_id))]
    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let product_id = self.product_id;
        db_pool
            .transaction::<_, ProductSummary, ServiceError>(|txn| {
                Box::pin(async move { summarize_product(txn, product_id).await })
            })
            .await
            .map_err(map_txn_err)
    }
}

async fn summarize_product(
    txn: &DatabaseTransaction,
    product_id: i64,
) -> Result<ProductSummary, ServiceError> {
    let item = product::Entity::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let batches = batch::Entity::find()
        .filter(batch::Column::ProductId.eq(product_id))
        .all(txn)
        .await?;
    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .all(txn)
        .await?;

    let total_supplied: i64 = batches.iter().map(|b| b.initial_quantity as i64).sum();
    let live_remaining: i64 = batches.iter().map(|b| b.remaining_quantity as i64).sum();
    let total_sold: i64 = movements
        .iter()
        .filter(|m| m.kind == MovementKind::Sale)
        .map(|m| m.quantity as i64)
        .sum();
    let total_written_off: i64 = movements
        .iter()
        .filter(|m| m.kind == MovementKind::WriteOff)
        .map(|m| m.quantity as i64)
        .sum();

    let total_remaining = total_supplied - total_sold - total_written_off;
    if total_remaining != live_remaining {
        return Err(ServiceError::ConsistencyViolation(format!(
            "Product {}: derived remaining {} != sum of batch remainders {}",
            product_id, total_remaining, live_remaining
        )));
    }

    let available_orders = if item.min_order_quantity > 0 {
        total_remaining / item.min_order_quantity as i64
    } else {
        0
    };

    Ok(ProductSummary {
        product_id,
        total_remaining,
        total_supplied,
        total_sold,
        total_written_off,
        available_orders,
    })
}

/// Portfolio-level stock KPIs across every product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioKpis {
    /// `sum(remaining * unit_price)` over all live batches.
    pub total_value: Decimal,
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
    pub reorder_count: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PortfolioKpisQuery;

#[async_trait]
impl Query for PortfolioKpisQuery {
    type Result = PortfolioKpis;

    #[instrument(skip(self, db_pool))]
    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        db_pool
            .transaction::<_, PortfolioKpis, ServiceError>(|txn| {
                Box::pin(async move {
                    let products = product::Entity::find().all(txn).await?;
                    let batches = batch::Entity::find().all(txn).await?;

                    let mut remaining_by_product: HashMap<i64, i64> =
                        products.iter().map(|p| (p.id, 0)).collect();
                    let mut total_value = Decimal::ZERO;
                    for b in &batches {
                        *remaining_by_product.entry(b.product_id).or_insert(0) +=
                            b.remaining_quantity as i64;
                        total_value += Decimal::from(b.remaining_quantity) * b.unit_price;
                    }

                    let mut kpis = PortfolioKpis {
                        total_value,
                        low_stock_count: 0,
                        out_of_stock_count: 0,
                        reorder_count: 0,
                    };
                    for remaining in remaining_by_product.values() {
                        if *remaining == 0 {
                            kpis.out_of_stock_count += 1;
                        } else {
                            if *remaining < LOW_STOCK_THRESHOLD {
                                kpis.low_stock_count += 1;
                            }
                            if *remaining < REORDER_THRESHOLD {
                                kpis.reorder_count += 1;
                            }
                        }
                    }
                    Ok(kpis)
                })
            })
            .await
            .map_err(map_txn_err)
    }
}
