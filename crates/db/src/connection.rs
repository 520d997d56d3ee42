use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use farebid_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the session database. A single-user session has no query fan-out;
/// the pool only covers the startup read plus the persister's flushes.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(database.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}

/// One-connection in-memory settings for tests. sqlite gives every pooled
/// connection its own `:memory:` database, so the pool must stay at one.
#[cfg(test)]
pub(crate) fn memory_settings() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        timeout_secs: 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{connect, memory_settings};

    #[tokio::test]
    async fn connects_and_serves_queries() {
        let pool = connect(&memory_settings()).await.expect("connect");
        sqlx::query("SELECT 1").execute(&pool).await.expect("query");
    }
}
