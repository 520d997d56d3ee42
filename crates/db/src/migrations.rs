use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connection::{connect, memory_settings};

    #[tokio::test]
    async fn migrations_create_the_session_kv_table() {
        let pool = connect(&memory_settings()).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = 'session_kv'",
        )
        .fetch_one(&pool)
        .await
        .expect("check session_kv table")
        .get::<i64, _>("count");

        assert_eq!(count, 1);
    }
}
