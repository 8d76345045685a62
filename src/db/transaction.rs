/*!
 * Transaction helpers
 *
 * Every mutating ledger operation runs as exactly one call to
 * [`with_transaction`]. The closure's error type comes back unchanged, so a
 * `ServiceError::InsufficientStock` raised inside the transaction is still an
 * `InsufficientStock` to the caller after the rollback.
 */

use sea_orm::{
    DatabaseConnection, DatabaseTransaction, DbErr, SqlErr, TransactionError, TransactionTrait,
};
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction.
///
/// Commits when the closure returns `Ok`, rolls back when it returns `Err`.
/// If the returned future is dropped before completion (request cancelled or
/// timed out) the `DatabaseTransaction` is dropped with it and rolls back.
///
/// ```rust,ignore
/// let log = with_transaction(&db, move |txn| {
///     Box::pin(async move {
///         let material = raw_material::Entity::find_by_id(material_id).one(txn).await?;
///         // ...
///         Ok(log)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<DbErr> + Send,
{
    db.transaction(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}

/// True when the database rejected a write because of a unique index.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use sea_orm::{ConnectionTrait, Database, Statement};

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.execute(Statement::from_string(
            db.get_database_backend(),
            "CREATE TABLE counters (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, value INTEGER NOT NULL)".to_owned(),
        ))
        .await
        .unwrap();
        db
    }

    async fn count_rows(db: &DatabaseConnection) -> i64 {
        let row = db
            .query_one(Statement::from_string(
                db.get_database_backend(),
                "SELECT COUNT(*) AS n FROM counters".to_owned(),
            ))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }

    #[tokio::test]
    async fn commits_on_success() {
        let db = memory_db().await;

        let value = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO counters (name, value) VALUES ('a', 1)".to_owned(),
                ))
                .await?;
                Ok::<_, ServiceError>(42)
            })
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(count_rows(&db).await, 1);
    }

    #[tokio::test]
    async fn rolls_back_and_keeps_typed_error() {
        let db = memory_db().await;

        let result: Result<(), ServiceError> = with_transaction(&db, |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO counters (name, value) VALUES ('a', 1)".to_owned(),
                ))
                .await?;
                Err(ServiceError::InsufficientStock("need 4, have 3".into()))
            })
        })
        .await;

        assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));
        assert_eq!(count_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn classifies_unique_violations() {
        let db = memory_db().await;
        let insert = "INSERT INTO counters (name, value) VALUES ('dup', 1)";
        db.execute(Statement::from_string(db.get_database_backend(), insert.to_owned()))
            .await
            .unwrap();

        let err = db
            .execute(Statement::from_string(db.get_database_backend(), insert.to_owned()))
            .await
            .unwrap_err();

        assert!(is_unique_violation(&err));
        assert!(!is_unique_violation(&DbErr::Custom("other".into())));
    }
}
