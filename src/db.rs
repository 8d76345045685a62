pub mod transaction;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use transaction::{is_unique_violation, with_transaction, BoxFuture};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Minimum number of connections
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle timeout duration
    pub idle_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
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
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

impl DbConfig {
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Pool size actually used, as `(max, min)`.
    ///
    /// SQLite admits one writer at a time and fails a second one with
    /// `SQLITE_BUSY`, so its pool is capped at a single connection and
    /// concurrent transactions queue on acquire instead.
    pub fn pool_bounds(&self) -> (u32, u32) {
        if self.is_sqlite() {
            (1, self.min_connections.min(1))
        } else {
            (self.max_connections, self.min_connections)
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
///
/// # Errors
/// Returns `ServiceError::DatabaseError` if the connection cannot be established
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Configuring database connection"
    );

    let (max_connections, min_connections) = config.pool_bounds();
    if max_connections < config.max_connections {
        warn!(
            requested = config.max_connections,
            max_connections, "SQLite pool capped to a single connection"
        );
    }

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("ledger.db.max_connections", max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        max_connections
    );

    let pool = Database::connect(opt).await.map_err(|e| {
        counter!("ledger.db.connection_failures", 1);
        error!(error = %e, "Database connection establishment failed");
        ServiceError::DatabaseError(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Applies every pending schema migration
///
/// # Errors
/// Returns `ServiceError::MigrationError` if any migration fails
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(|e| ServiceError::MigrationError(e.to_string()));

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let start = std::time::Instant::now();
    let result = pool.ping().await.map_err(ServiceError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("ledger.db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("ledger.db.connection_failures", 1);
        }
    }

    result
}

/// Fresh migrated in-memory database for unit tests
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        idle_timeout: Duration::from_secs(3_600),
        ..Default::default()
    };
    let pool = establish_connection_with_config(&config)
        .await
        .expect("in-memory database");
    run_migrations(&pool).await.expect("migrations apply");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_pool_is_capped_to_one_connection() {
        let config = DbConfig {
            url: "sqlite://ledger.db?mode=rwc".to_string(),
            max_connections: 8,
            min_connections: 2,
            ..Default::default()
        };
        assert_eq!(config.pool_bounds(), (1, 1));

        let memory = DbConfig {
            url: "sqlite::memory:".to_string(),
            min_connections: 0,
            ..Default::default()
        };
        assert_eq!(memory.pool_bounds(), (1, 0));
    }

    #[test]
    fn postgres_pool_keeps_requested_size() {
        let config = DbConfig {
            url: "postgres://ledger@localhost/ledger".to_string(),
            max_connections: 8,
            min_connections: 2,
            ..Default::default()
        };
        assert!(!config.is_sqlite());
        assert_eq!(config.pool_bounds(), (8, 2));
    }

    #[tokio::test]
    async fn migrated_pool_answers_pings() {
        let pool = test_pool().await;
        assert!(check_connection(&pool).await.is_ok());
    }
}
