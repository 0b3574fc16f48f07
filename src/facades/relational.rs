//! # Relational facade (PostgreSQL via sqlx).
//!
//! [`Database`] runs statements on the supervised `PgPool`. Parameters are passed as
//! [`SqlValue`]s and bound positionally (`$1`, `$2`, ...); rows come back as sqlx
//! [`PgRow`]s, read with [`sqlx::Row::try_get`].
//!
//! ```no_run
//! # async fn demo(db: linkvisor::facades::Database) -> Result<(), linkvisor::SupervisorError> {
//! use sqlx::Row;
//!
//! db.exec("INSERT INTO users (name) VALUES ($1)", &["ada".into()]).await?;
//! if let Some(row) = db.query_row("SELECT count(*) AS n FROM users", &[]).await? {
//!     let n: i64 = row.try_get("n").unwrap_or_default();
//!     println!("{n} users");
//! }
//!
//! let mut tx = db.begin_transaction().await?;
//! tx.exec("DELETE FROM users WHERE name = $1", &["ada".into()]).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};

use crate::backends::postgres::{PostgresConnector, classify};
use crate::core::{Lease, Supervisor};
use crate::error::SupervisorError;

/// A positional statement parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// `boolean`.
    Bool(bool),
    /// `bigint`.
    Int(i64),
    /// `double precision`.
    Float(f64),
    /// `text`.
    Text(String),
    /// `bytea`.
    Bytes(Vec<u8>),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

fn bind_all<'q>(sql: &'q str, params: &[SqlValue]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bytes(v) => query.bind(v.clone()),
        })
}

/// Relational operations routed through a PostgreSQL [`Supervisor`].
#[derive(Clone)]
pub struct Database {
    supervisor: Arc<Supervisor<PostgresConnector>>,
}

impl Database {
    /// Wraps a supervisor.
    pub fn new(supervisor: Arc<Supervisor<PostgresConnector>>) -> Self {
        Self { supervisor }
    }

    /// Runs a statement and returns all rows.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn query(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<PgRow>, SupervisorError> {
        self.supervisor
            .with_lease(|pool| async move {
                bind_all(sql, params).fetch_all(&*pool).await.map_err(classify)
            })
            .await
    }

    /// Runs a statement and returns its first row, if any.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn query_row(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<PgRow>, SupervisorError> {
        self.supervisor
            .with_lease(|pool| async move {
                bind_all(sql, params)
                    .fetch_optional(&*pool)
                    .await
                    .map_err(classify)
            })
            .await
    }

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn exec(&self, sql: &str, params: &[SqlValue]) -> Result<u64, SupervisorError> {
        self.supervisor
            .with_lease(|pool| async move {
                bind_all(sql, params)
                    .execute(&*pool)
                    .await
                    .map(|done| done.rows_affected())
                    .map_err(classify)
            })
            .await
    }

    /// Starts a transaction on one pooled connection.
    ///
    /// The transaction stays on the handle it was started on. If that handle is
    /// replaced, later statements fail with `Unavailable`.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn begin_transaction(&self) -> Result<Transaction, SupervisorError> {
        let mut generation = 0;
        let tx = self
            .supervisor
            .with_lease(|pool: Lease<PgPool>| {
                generation = pool.generation();
                async move { pool.begin().await.map_err(classify) }
            })
            .await?;
        Ok(Transaction {
            tx,
            generation,
            supervisor: Arc::clone(&self.supervisor),
        })
    }

    /// The underlying supervisor.
    pub fn supervisor(&self) -> &Arc<Supervisor<PostgresConnector>> {
        &self.supervisor
    }

    /// Shuts the underlying supervisor down.
    pub async fn shutdown(&self) {
        self.supervisor.shutdown().await;
    }
}

/// An open transaction. Dropping it without [`commit`](Transaction::commit) rolls back.
pub struct Transaction {
    tx: sqlx::Transaction<'static, Postgres>,
    generation: u64,
    supervisor: Arc<Supervisor<PostgresConnector>>,
}

impl Transaction {
    /// Runs a statement inside the transaction and returns all rows.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<PgRow>, SupervisorError> {
        let res = bind_all(sql, params).fetch_all(&mut *self.tx).await;
        self.settle(res)
    }

    /// Runs a statement inside the transaction and returns the affected row count.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn exec(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SupervisorError> {
        let res = bind_all(sql, params).execute(&mut *self.tx).await;
        self.settle(res.map(|done| done.rows_affected()))
    }

    /// Commits.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn commit(self) -> Result<(), SupervisorError> {
        let Self {
            tx,
            generation,
            supervisor,
        } = self;
        let res = tx.commit().await;
        settle(&supervisor, generation, res)
    }

    /// Rolls back.
    ///
    /// # Errors
    /// See [`SupervisorError`].
    pub async fn rollback(self) -> Result<(), SupervisorError> {
        let Self {
            tx,
            generation,
            supervisor,
        } = self;
        let res = tx.rollback().await;
        settle(&supervisor, generation, res)
    }

    /// Generation of the handle the transaction runs on.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn settle<T>(&self, res: Result<T, sqlx::Error>) -> Result<T, SupervisorError> {
        settle(&self.supervisor, self.generation, res)
    }
}

fn settle<T>(
    supervisor: &Supervisor<PostgresConnector>,
    generation: u64,
    res: Result<T, sqlx::Error>,
) -> Result<T, SupervisorError> {
    res.map_err(|err| {
        let err = classify(err);
        if err.is_connectivity() {
            supervisor.report_suspect(generation);
        }
        SupervisorError::from_transport(supervisor.backend(), err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_params_become_null() {
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("x")), SqlValue::Text("x".into()));
        assert_eq!(SqlValue::from(7_i32), SqlValue::Int(7));
    }
}
