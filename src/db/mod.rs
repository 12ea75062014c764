//! Account database.
//!
//! SQLite through a small sqlx pool. Schema lives in `migrations/` and is
//! applied on connect.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::AccountSettings;

pub mod accounts;

pub use accounts::AccountStore;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and bring the schema up to date.
    pub async fn connect(settings: &AccountSettings) -> anyhow::Result<Self> {
        Self::connect_url(&settings.database_url, settings.max_connections).await
    }

    /// `sqlite::memory:` needs `max_connections = 1`, every connection is its own database.
    pub async fn connect_url(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        info!("account database ready");
        Ok(db)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
