use crate::config::EngineConfig;
use crate::entities::{batch, product, stock_movement, supply};
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Connection pool tuning for the persistence store.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub sqlx_logging: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
            sqlx_logging: false,
        }
    }
}

impl From<&EngineConfig> for DbConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            ..Default::default()
        }
    }
}

/// Establishes a connection pool to the database with default tuning.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with explicit tuning.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(config.sqlx_logging);

    let db_pool = Database::connect(opt).await?;

    info!(
        max_connections = config.max_connections,
        "database connection pool established"
    );
    Ok(db_pool)
}

/// Establishes a pool from engine configuration, creating the schema first
/// when `auto_schema` is set.
pub async fn establish_connection_from_engine_config(
    cfg: &EngineConfig,
) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    let pool = establish_connection_with_config(&db_cfg).await?;
    if cfg.auto_schema {
        create_schema(&pool).await?;
    }
    Ok(pool)
}

/// Creates the engine tables from the entity definitions if they do not
/// already exist. Table order respects foreign keys.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut products = schema.create_table_from_entity(product::Entity);
    let mut supplies = schema.create_table_from_entity(supply::Entity);
    let mut batches = schema.create_table_from_entity(batch::Entity);
    let mut movements = schema.create_table_from_entity(stock_movement::Entity);

    products.if_not_exists();
    supplies.if_not_exists();
    batches.if_not_exists();
    movements.if_not_exists();

    for stmt in [&products, &supplies, &batches, &movements] {
        db.execute(backend.build(stmt)).await?;
    }

    info!("engine schema ensured");
    Ok(())
}
