use crate::errors::ServiceError;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;

/// Read-side counterpart of [`crate::commands::Command`]. Queries never
/// mutate; aggregations run inside a read transaction so they observe one
/// committed snapshot.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError>;
}

pub mod inventory_queries;
