//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::listing::ListLimits;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL. Only commands that query need it.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Schema catalog file (default: config/shop-schema.toml).
    pub schema_path: PathBuf,

    /// Page size when the caller gives none (default: 10).
    pub list_default_limit: u64,

    /// Largest page size a caller may ask for (default: 100).
    pub list_max_limit: u64,

    /// Per-statement timeout inside a listing transaction (default: 10s).
    pub statement_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let schema_path = env::var("SCHEMA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/shop-schema.toml"));

        let list_default_limit = env::var("LIST_DEFAULT_LIMIT")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("LIST_DEFAULT_LIMIT must be a valid u64")?;

        let list_max_limit = env::var("LIST_MAX_LIMIT")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .context("LIST_MAX_LIMIT must be a valid u64")?;

        let statement_timeout_secs: u64 = env::var("STATEMENT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("STATEMENT_TIMEOUT_SECS must be a valid u64")?;

        let config = Self {
            database_url,
            database_max_connections,
            schema_path,
            list_default_limit,
            list_max_limit,
            statement_timeout: Duration::from_secs(statement_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.list_default_limit == 0 {
            bail!("LIST_DEFAULT_LIMIT must be at least 1");
        }
        if self.list_default_limit > self.list_max_limit {
            bail!(
                "LIST_DEFAULT_LIMIT ({}) must not exceed LIST_MAX_LIMIT ({})",
                self.list_default_limit,
                self.list_max_limit
            );
        }
        if self.statement_timeout.is_zero() {
            bail!("STATEMENT_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }

    /// The database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }

    pub fn limits(&self) -> ListLimits {
        ListLimits {
            default_limit: self.list_default_limit,
            max_limit: self.list_max_limit,
        }
    }
}
