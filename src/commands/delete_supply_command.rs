use crate::{
    commands::Command,
    db::DbPool,
    entities::{batch, stock_movement, supply},
    errors::ServiceError,
    events::{Event, EventSender},
};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, TransactionError,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref SUPPLIES_DELETED: IntCounter = IntCounter::new(
        "warehouse_supplies_deleted_total",
        "Total number of supplies deleted"
    )
    .expect("metric can be created");
    static ref SUPPLY_DELETE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "warehouse_supply_delete_failures_total",
            "Total number of failed supply deletions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
}

/// Removes a supply, all its batches, and every movement recorded against
/// those batches, in one atomic unit.
///
/// Partially-consumed batches do not block deletion: this is a hard delete
/// with audit loss, and callers are expected to gate it behind confirmation.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteSupplyCommand {
    pub supply_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSupplyResult {
    pub supply_id: i64,
    pub batches_removed: u64,
    pub movements_removed: u64,
    /// Products whose aggregates changed; callers re-query these.
    pub product_ids: Vec<i64>,
}

#[async_trait::async_trait]
impl Command for DeleteSupplyCommand {
    type Result = DeleteSupplyResult;

    #[instrument(skip(self, db_pool, event_sender), fields(supply_id = self.supply_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let result = self.delete_in_db(&db_pool).await.map_err(|e| {
            SUPPLY_DELETE_FAILURES
                .with_label_values(&[e.metric_label()])
                .inc();
            e
        })?;

        SUPPLIES_DELETED.inc();
        info!(
            batches_removed = result.batches_removed,
            movements_removed = result.movements_removed,
            "supply deleted"
        );

        let event = Event::SupplyDeleted {
            operation_id: Uuid::new_v4(),
            supply_id: result.supply_id,
            batches_removed: result.batches_removed,
            movements_removed: result.movements_removed,
            product_ids: result.product_ids.clone(),
        };
        if let Err(e) = event_sender.send(event).await {
            let err = ServiceError::EventError(e);
            warn!("supply deleted but event not delivered: {}", err);
        }

        Ok(result)
    }
}

impl DeleteSupplyCommand {
    /// Product ids a deletion would touch, for lock acquisition before the
    /// transaction starts. Batch membership of a supply is immutable, so the
    /// set cannot change between this read and the delete.
    pub async fn affected_products(
        &self,
        db: &DatabaseConnection,
    ) -> Result<Vec<i64>, ServiceError> {
        let batches = batch::Entity::find()
            .filter(batch::Column::SupplyId.eq(self.supply_id))
            .all(db)
            .await?;
        let ids: BTreeSet<i64> = batches.iter().map(|b| b.product_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn delete_in_db(
        &self,
        db: &DatabaseConnection,
    ) -> Result<DeleteSupplyResult, ServiceError> {
        let supply_id = self.supply_id;

        db.transaction::<_, DeleteSupplyResult, ServiceError>(|txn| {
            Box::pin(async move {
                let existing = supply::Entity::find_by_id(supply_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Supply {} not found", supply_id))
                    })?;

                let batches = batch::Entity::find()
                    .filter(batch::Column::SupplyId.eq(supply_id))
                    .all(txn)
                    .await?;
                let batch_ids: Vec<i64> = batches.iter().map(|b| b.id).collect();
                let product_ids: BTreeSet<i64> = batches.iter().map(|b| b.product_id).collect();

                let movements_removed = if batch_ids.is_empty() {
                    0
                } else {
                    stock_movement::Entity::delete_many()
                        .filter(stock_movement::Column::BatchId.is_in(batch_ids.clone()))
                        .exec(txn)
                        .await?
                        .rows_affected
                };

                let batches_removed = batch::Entity::delete_many()
                    .filter(batch::Column::SupplyId.eq(supply_id))
                    .exec(txn)
                    .await?
                    .rows_affected;

                existing.delete(txn).await?;

                Ok(DeleteSupplyResult {
                    supply_id,
                    batches_removed,
                    movements_removed,
                    product_ids: product_ids.into_iter().collect(),
                })
            })
        })
        .await
        .map_err(|e| {
            error!("Transaction failed while deleting supply: {}", e);
            match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            }
        })
    }
}
