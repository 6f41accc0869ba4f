#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::BadgeRecord;
use nowtalk_core::{BadgeStatus, MacAddress};
use sqlx::SqlitePool;
use tracing::debug;

/// Persistence contract for the badge registry.
///
/// Uses native async trait methods (Edition 2024), so no `async-trait`
/// crate is needed.
pub trait BadgeRepository: Send + Sync {
    /// All rows with any bit of `mask` set, ordered by `(status, name)`.
    async fn load_all(&self, mask: u8) -> StorageResult<Vec<BadgeRecord>>;

    async fn find(&self, mac: MacAddress) -> StorageResult<Option<BadgeRecord>>;

    /// Insert or overwrite the row keyed by `mac`. Only the high nibble of
    /// `status` is stored.
    async fn upsert(&self, record: &BadgeRecord) -> StorageResult<()>;

    /// Returns `true` if a row was removed.
    async fn delete(&self, mac: MacAddress) -> StorageResult<bool>;
}

/// SQLite implementation of [`BadgeRepository`].
#[derive(Debug, Clone)]
pub struct SqliteBadgeRepository {
    pool: SqlitePool,
}

impl SqliteBadgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl BadgeRepository for SqliteBadgeRepository {
    async fn load_all(&self, mask: u8) -> StorageResult<Vec<BadgeRecord>> {
        let rows = sqlx::query_as::<_, BadgeRecord>(
            r#"
            SELECT mac, status, ip, name, key
            FROM users
            WHERE status & ? != 0
            ORDER BY status, name
            "#,
        )
        .bind(i64::from(mask))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), mask, "Loaded badge rows");
        Ok(rows)
    }

    async fn find(&self, mac: MacAddress) -> StorageResult<Option<BadgeRecord>> {
        let row = sqlx::query_as::<_, BadgeRecord>(
            r#"
            SELECT mac, status, ip, name, key
            FROM users
            WHERE mac = ?
            "#,
        )
        .bind(mac.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert(&self, record: &BadgeRecord) -> StorageResult<()> {
        let status = i64::from(BadgeStatus::from_bits((record.status & 0xFF) as u8).persisted());

        sqlx::query(
            r#"
            INSERT INTO users (mac, status, ip, name, key)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(mac) DO UPDATE SET
                status = excluded.status,
                ip = excluded.ip,
                name = excluded.name,
                key = excluded.key
            "#,
        )
        .bind(&record.mac)
        .bind(status)
        .bind(&record.ip)
        .bind(&record.name)
        .bind(&record.key)
        .execute(&self.pool)
        .await?;

        debug!(mac = %record.mac, status, "Badge row upserted");
        Ok(())
    }

    async fn delete(&self, mac: MacAddress) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE mac = ?")
            .bind(mac.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
