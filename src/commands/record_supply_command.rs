use crate::{
    commands::Command,
    db::DbPool,
    entities::{batch, product, supply},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref SUPPLIES_RECORDED: IntCounter = IntCounter::new(
        "warehouse_supplies_recorded_total",
        "Total number of supplies recorded"
    )
    .expect("metric can be created");
    static ref SUPPLY_RECORD_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "warehouse_supply_record_failures_total",
            "Total number of failed supply recordings"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref BATCHES_RECORDED: IntCounter = IntCounter::new(
        "warehouse_batches_recorded_total",
        "Total number of batches recorded"
    )
    .expect("metric can be created");
}

/// One line of an incoming delivery: a lot of a single product.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct SupplyLineInput {
    pub product_id: i64,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Creates a supply and all of its batches in one atomic unit. A supply is
/// never partially persisted: any invalid line rejects the whole command
/// before mutation.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RecordSupplyCommand {
    #[validate(length(min = 1))]
    pub supplier: String,
    pub delivered_on: NaiveDate,
    pub delivery_price: Option<Decimal>,
    #[validate(length(max = 500))]
    pub comment: Option<String>,
    #[validate]
    pub lines: Vec<SupplyLineInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSupplyResult {
    pub supply_id: i64,
    pub batch_ids: Vec<i64>,
    pub product_ids: Vec<i64>,
}

#[async_trait::async_trait]
impl Command for RecordSupplyCommand {
    type Result = RecordSupplyResult;

    #[instrument(skip(self, db_pool, event_sender), fields(supplier = %self.supplier))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate_input().map_err(|e| {
            SUPPLY_RECORD_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            e
        })?;

        let result = self.record_in_db(&db_pool).await.map_err(|e| {
            SUPPLY_RECORD_FAILURES
                .with_label_values(&[e.metric_label()])
                .inc();
            e
        })?;

        SUPPLIES_RECORDED.inc();
        BATCHES_RECORDED.inc_by(result.batch_ids.len() as u64);
        info!(
            supply_id = result.supply_id,
            batches = result.batch_ids.len(),
            "supply recorded"
        );

        let event = Event::SupplyRecorded {
            operation_id: Uuid::new_v4(),
            supply_id: result.supply_id,
            batch_ids: result.batch_ids.clone(),
            product_ids: result.product_ids.clone(),
        };
        if let Err(e) = event_sender.send(event).await {
            // The transaction is committed; a dead notification channel must
            // not undo it.
            let err = ServiceError::EventError(e);
            tracing::warn!("supply recorded but event not delivered: {}", err);
        }

        Ok(result)
    }
}

impl RecordSupplyCommand {
    fn validate_input(&self) -> Result<(), ServiceError> {
        if self.lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Supply must contain at least one batch line".to_string(),
            ));
        }
        self.validate()
            .map_err(|e| ServiceError::ValidationError(format!("Invalid supply input: {}", e)))?;

        if let Some(price) = self.delivery_price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Delivery price must not be negative".to_string(),
                ));
            }
        }
        for line in &self.lines {
            if line.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Unit price must not be negative for product {}",
                    line.product_id
                )));
            }
        }
        Ok(())
    }

    async fn record_in_db(
        &self,
        db: &DatabaseConnection,
    ) -> Result<RecordSupplyResult, ServiceError> {
        let supplier = self.supplier.clone();
        let delivered_on = self.delivered_on;
        let delivery_price = self.delivery_price;
        let comment = self.comment.clone();
        let lines = self.lines.clone();

        db.transaction::<_, RecordSupplyResult, ServiceError>(|txn| {
            Box::pin(async move {
                let product_ids: BTreeSet<i64> = lines.iter().map(|l| l.product_id).collect();
                let known = product::Entity::find()
                    .filter(product::Column::Id.is_in(product_ids.iter().copied()))
                    .all(txn)
                    .await?;
                if known.len() != product_ids.len() {
                    let known_ids: BTreeSet<i64> = known.iter().map(|p| p.id).collect();
                    let missing: Vec<String> = product_ids
                        .difference(&known_ids)
                        .map(|id| id.to_string())
                        .collect();
                    return Err(ServiceError::NotFound(format!(
                        "Product(s) not found: {}",
                        missing.join(", ")
                    )));
                }

                let now = Utc::now();
                let saved_supply = supply::ActiveModel {
                    supplier: Set(supplier),
                    delivered_on: Set(delivered_on),
                    delivery_price: Set(delivery_price),
                    comment: Set(comment),
                    created_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                let mut batch_ids = Vec::with_capacity(lines.len());
                for line in &lines {
                    let saved_batch = batch::ActiveModel {
                        product_id: Set(line.product_id),
                        supply_id: Set(saved_supply.id),
                        delivered_on: Set(delivered_on),
                        initial_quantity: Set(line.quantity),
                        unit_price: Set(line.unit_price),
                        remaining_quantity: Set(line.quantity),
                        created_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;
                    batch_ids.push(saved_batch.id);
                }

                Ok(RecordSupplyResult {
                    supply_id: saved_supply.id,
                    batch_ids,
                    product_ids: product_ids.into_iter().collect(),
                })
            })
        })
        .await
        .map_err(|e| {
            error!("Transaction failed while recording supply: {}", e);
            match e {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            }
        })
    }
}
