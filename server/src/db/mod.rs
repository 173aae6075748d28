// Database module for the MDM control plane
// SQLite with WAL journaling (`spec.md` §5), embedded migrations applied
// at startup (`spec.md` §6 "Persistence layout").

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub mod audit;
pub mod commands;
pub mod devices;
pub mod tenants;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "mdm.sqlite3".to_string(),
            max_connections: 10,
        }
    }
}

/// Creates a database connection pool. WAL journaling lets concurrent
/// readers proceed alongside the single writer (`spec.md` §5); foreign
/// keys are enforced so a device/command row can never outlive its
/// tenant/device parent silently.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
}

/// Runs embedded database migrations. Each migration runs inside its own
/// transaction; sqlx's own `_sqlx_migrations` bookkeeping table plays the
/// role of `spec.md` §6's named "schema_migrations" table (see DESIGN.md).
/// Re-running against an already-migrated database is a no-op.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "mdm.sqlite3");
        assert_eq!(config.max_connections, 10);
    }

    #[tokio::test]
    async fn in_memory_pool_runs_migrations() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
