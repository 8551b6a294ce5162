use crate::{
    commands::Command,
    db::DbPool,
    entities::{
        batch, product,
        stock_movement::{self, MovementKind},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref CONSUMPTIONS_TOTAL: IntCounter = IntCounter::new(
        "warehouse_consumptions_total",
        "Total number of stock consumptions"
    )
    .expect("metric can be created");
    static ref CONSUMPTION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "warehouse_consumption_failures_total",
            "Total number of failed stock consumptions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref CONSUMED_QUANTITY: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "warehouse_consumed_quantity_total",
            "Total quantity of stock consumed"
        ),
        &["kind"]
    )
    .expect("metric can be created");
}

/// Debits a product by the requested quantity, strictly oldest batch first.
///
/// The walk order is `(delivered_on ASC, id ASC)`; a single request may span
/// several batches, and one movement row is written per batch touched. If the
/// product's total remaining stock cannot cover the request, nothing is
/// mutated. This command is the only writer of `batch.remaining_quantity`.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ConsumeStockCommand {
    pub product_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub kind: MovementKind,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
}

/// One debit taken from one batch, in FIFO order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDebit {
    pub batch_id: i64,
    pub quantity_taken: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeStockResult {
    pub product_id: i64,
    pub kind: MovementKind,
    /// Which batches were debited and by how much, in consumption order.
    /// Required for cost-of-goods attribution and audit trails.
    pub allocations: Vec<BatchDebit>,
}

#[async_trait::async_trait]
impl Command for ConsumeStockCommand {
    type Result = ConsumeStockResult;

    #[instrument(skip(self, db_pool, event_sender), fields(product_id = self.product_id, quantity = self.quantity))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate().map_err(|e| {
            CONSUMPTION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::ValidationError(format!("Invalid consumption input: {}", e))
        })?;

        let result = self.consume_in_db(&db_pool).await.map_err(|e| {
            CONSUMPTION_FAILURES
                .with_label_values(&[e.metric_label()])
                .inc();
            e
        })?;

        CONSUMPTIONS_TOTAL.inc();
        CONSUMED_QUANTITY
            .with_label_values(&[self.kind.as_str()])
            .inc_by(self.quantity as u64);
        info!(
            batches = result.allocations.len(),
            kind = self.kind.as_str(),
            "stock consumed"
        );

        let event = Event::StockConsumed {
            operation_id: Uuid::new_v4(),
            product_id: self.product_id,
            kind: self.kind,
            quantity: self.quantity,
            batches_touched: result.allocations.len(),
        };
        if let Err(e) = event_sender.send(event).await {
            let err = ServiceError::EventError(e);
            tracing::warn!("stock consumed but event not delivered: {}", err);
        }

        Ok(result)
    }
}

impl ConsumeStockCommand {
    async fn consume_in_db(
        &self,
        db: &DatabaseConnection,
    ) -> Result<ConsumeStockResult, ServiceError> {
        let product_id = self.product_id;
        let quantity = self.quantity;
        let kind = self.kind;
        let comment = self.comment.clone();

        db.transaction::<_, ConsumeStockResult, ServiceError>(|txn| {
            Box::pin(async move {
                product::Entity::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;

                // FIFO order: oldest delivery first, lower batch id breaking
                // date ties.
                let live_batches = batch::Entity::find()
                    .filter(batch::Column::ProductId.eq(product_id))
                    .filter(batch::Column::RemainingQuantity.gt(0))
                    .order_by_asc(batch::Column::DeliveredOn)
                    .order_by_asc(batch::Column::Id)
                    .all(txn)
                    .await?;

                let total_remaining: i64 = live_batches
                    .iter()
                    .map(|b| b.remaining_quantity as i64)
                    .sum();
                if total_remaining < quantity as i64 {
                    // All-or-nothing: reject before any batch is touched.
                    return Err(ServiceError::InsufficientStock(format!(
                        "Product {}: requested {}, remaining {}",
                        product_id, quantity, total_remaining
                    )));
                }

                let now = Utc::now();
                let mut still_needed = quantity;
                let mut allocations = Vec::new();

                for lot in live_batches {
                    if still_needed == 0 {
                        break;
                    }
                    let take = lot.remaining_quantity.min(still_needed);
                    let new_remaining = lot.remaining_quantity - take;
                    if new_remaining < 0 || new_remaining > lot.initial_quantity {
                        return Err(ServiceError::ConsistencyViolation(format!(
                            "Batch {}: remainder {} out of range 0..={}",
                            lot.id, new_remaining, lot.initial_quantity
                        )));
                    }

                    let batch_id = lot.id;
                    let mut active: batch::ActiveModel = lot.into();
                    active.remaining_quantity = Set(new_remaining);
                    active.update(txn).await?;

                    stock_movement::ActiveModel {
                        batch_id: Set(batch_id),
                        product_id: Set(product_id),
                        kind: Set(kind),
                        quantity: Set(take),
                        comment: Set(comment.clone()),
                        occurred_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    allocations.push(BatchDebit {
                        batch_id,
                        quantity_taken: take,
                    });
                    still_needed -= take;
                }

                if still_needed != 0 {
                    return Err(ServiceError::ConsistencyViolation(format!(
                        "Product {}: {} units unallocated after FIFO walk",
                        product_id, still_needed
                    )));
                }

                Ok(ConsumeStockResult {
                    product_id,
                    kind,
                    allocations,
                })
            })
        })
        .await
        .map_err(|e| {
            error!("Transaction failed while consuming stock: {}", e);
            match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            }
        })
    }
}
