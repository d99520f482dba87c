//! Listing context.
//!
//! Everything a listing needs is held here and passed explicitly: the schema
//! registry, the execution backend and the pagination limits.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;
use crate::db::{self, ListBackend, PgBackend};
use crate::listing::ListLimits;
use crate::schema::SchemaRegistry;

/// Shared listing context. Cheap to clone.
#[derive(Clone)]
pub struct ListContext {
    inner: Arc<ListContextInner>,
}

struct ListContextInner {
    registry: Arc<SchemaRegistry>,
    backend: Arc<dyn ListBackend>,
    limits: ListLimits,
    /// Present when the context owns a pool it must close.
    pool: Option<PgPool>,
}

impl ListContext {
    /// Context over an existing registry and backend.
    pub fn new(
        registry: Arc<SchemaRegistry>,
        backend: Arc<dyn ListBackend>,
        limits: ListLimits,
    ) -> Self {
        Self {
            inner: Arc::new(ListContextInner {
                registry,
                backend,
                limits,
                pool: None,
            }),
        }
    }

    /// Load the schema catalog and connect to PostgreSQL.
    pub async fn connect(config: &Config) -> Result<Self> {
        let registry = SchemaRegistry::load_file(&config.schema_path)?;
        info!(
            path = %config.schema_path.display(),
            entities = registry.len(),
            "schema catalog loaded"
        );

        let pool = db::create_pool(config)
            .await
            .context("failed to create listing context")?;
        info!(
            max_connections = config.database_max_connections,
            "database pool ready"
        );

        let backend = PgBackend::new(pool.clone(), config.statement_timeout);
        Ok(Self {
            inner: Arc::new(ListContextInner {
                registry: Arc::new(registry),
                backend: Arc::new(backend),
                limits: config.limits(),
                pool: Some(pool),
            }),
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn backend(&self) -> &dyn ListBackend {
        self.inner.backend.as_ref()
    }

    pub fn limits(&self) -> ListLimits {
        self.inner.limits
    }

    /// Close the owned pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        if let Some(pool) = &self.inner.pool {
            pool.close().await;
            info!("database pool closed");
        }
    }
}
