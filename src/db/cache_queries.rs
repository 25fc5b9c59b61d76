use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::services::cache::{CacheEntry, CacheError, CacheStore, CacheTable};

/// Postgres-backed [`CacheStore`], one table per logical cache.
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn load(&self, table: CacheTable, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        // Table names come from a closed enum, never from input.
        let row = sqlx::query(&format!(
            "SELECT key, payload, updated_at FROM {} WHERE key = $1",
            table.table_name()
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(CacheEntry {
                key: r.try_get("key")?,
                payload: r.try_get("payload")?,
                updated_at: r.try_get("updated_at")?,
            }),
            None => None,
        })
    }

    async fn store(&self, table: CacheTable, entry: CacheEntry) -> Result<(), CacheError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (key, payload, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at
            "#,
            table.table_name()
        ))
        .bind(&entry.key)
        .bind(&entry.payload)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
