//! Database connection pool management and statement execution.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::Postgres;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Opens listing sessions.
///
/// Statements reach the backend already rendered, so nothing borrowed from
/// the query builder is held across an await.
#[async_trait]
pub trait ListBackend: Send + Sync {
    /// Start a session for one listing request.
    async fn session(&self) -> Result<Box<dyn ListSession>, sqlx::Error>;
}

/// One listing request's view of the database.
///
/// Every statement run through a session sees the same snapshot, so the
/// count, the page and any eager-loaded rows agree.
#[async_trait]
pub trait ListSession: Send {
    /// Run a `SELECT COUNT(*)` statement.
    async fn count(&mut self, sql: &str) -> Result<u64, sqlx::Error>;

    /// Run a select, returning every row as a JSON object.
    async fn fetch(&mut self, sql: &str) -> Result<Vec<Value>, sqlx::Error>;

    /// End the session. Dropping a session without finishing it discards it.
    async fn finish(&mut self) -> Result<(), sqlx::Error>;
}

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// [`ListBackend`] over a PostgreSQL pool.
///
/// A session checks out one connection and holds a read-only
/// `REPEATABLE READ` transaction with a statement timeout until it finishes.
/// The transaction rolls back when dropped on an error path.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgBackend {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl ListBackend for PgBackend {
    async fn session(&self) -> Result<Box<dyn ListSession>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}ms'",
            self.statement_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        Ok(Box::new(PgSession { tx: Some(tx) }))
    }
}

/// A [`ListSession`] holding one open transaction.
pub struct PgSession {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgSession {
    fn tx(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>, sqlx::Error> {
        self.tx
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("listing session already finished".to_string()))
    }
}

#[async_trait]
impl ListSession for PgSession {
    async fn count(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        tracing::debug!(sql = %sql, "counting listing");
        let tx = self.tx()?;
        let total: i64 = sqlx::query_scalar(sql).fetch_one(&mut **tx).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn fetch(&mut self, sql: &str) -> Result<Vec<Value>, sqlx::Error> {
        tracing::debug!(sql = %sql, "fetching rows");
        let tx = self.tx()?;
        sqlx::query_scalar(&format!("SELECT row_to_json(t) FROM ({sql}) t"))
            .fetch_all(&mut **tx)
            .await
    }

    async fn finish(&mut self) -> Result<(), sqlx::Error> {
        match self.tx.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }
}
