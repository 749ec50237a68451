use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ChangeFeed, ItemStore};
use crate::config::DatabaseConfig;
use crate::models::{ChangeEvent, EventKind, MonitoredItem, StreamRecord};
use crate::utils::error::{AppError, Result};

const ITEM_COLUMNS: &str = "id, url, selector, item, price, email";

/// SQLite-backed item store and change feed.
///
/// Writers take `write_lock` before opening their transaction. A deferred
/// transaction that reads before it writes cannot be upgraded while another
/// connection holds the write lock, so concurrent writers would fail with
/// `SQLITE_BUSY` instead of waiting.
#[derive(Clone)]
pub struct SqliteItemStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteItemStore {
    /// Opens (creating if needed) the database and applies migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        // Ensure directory exists
        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_item(conn: &mut SqliteConnection, id: &str) -> Result<Option<MonitoredItem>> {
        let item = sqlx::query_as::<_, MonitoredItem>(&format!(
            "SELECT {} FROM items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(item)
    }

    async fn append_change(conn: &mut SqliteConnection, event: &ChangeEvent) -> Result<()> {
        let item_id = event
            .item_id()
            .ok_or_else(|| AppError::Internal("change event without a snapshot".to_string()))?;
        let before_json = event.before.as_ref().map(serde_json::to_string).transpose()?;
        let after_json = event.after.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r"
            INSERT INTO item_changes (event_kind, item_id, before_json, after_json, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(event.event_kind)
        .bind(item_id)
        .bind(before_json)
        .bind(after_json)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        debug!("Recorded {:?} for item {}", event.event_kind, item_id);
        Ok(())
    }
}

fn decode_snapshot(json: Option<String>) -> Result<Option<MonitoredItem>> {
    json.map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(AppError::from)
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn scan_all(&self) -> Result<Vec<MonitoredItem>> {
        let items = sqlx::query_as::<_, MonitoredItem>(&format!(
            "SELECT {} FROM items ORDER BY id",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn get(&self, id: &str) -> Result<Option<MonitoredItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_item(&mut *conn, id).await
    }

    async fn put(&self, item: &MonitoredItem) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let before = Self::fetch_item(&mut *tx, &item.id).await?;
        if before.as_ref() == Some(item) {
            debug!("Item {} unchanged, skipping write", item.id);
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO items (id, url, selector, item, price, email)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                selector = excluded.selector,
                item = excluded.item,
                price = excluded.price,
                email = excluded.email
            ",
        )
        .bind(&item.id)
        .bind(&item.url)
        .bind(&item.selector)
        .bind(&item.item)
        .bind(&item.price)
        .bind(&item.email)
        .execute(&mut *tx)
        .await?;

        let event = match before {
            Some(before) => ChangeEvent::modify(before, item.clone()),
            None => ChangeEvent::insert(item.clone()),
        };
        Self::append_change(&mut *tx, &event).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<MonitoredItem> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let before = Self::fetch_item(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("item {}", id),
            })?;

        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        Self::append_change(&mut *tx, &ChangeEvent::remove(before.clone())).await?;

        tx.commit().await?;
        Ok(before)
    }
}

#[async_trait]
impl ChangeFeed for SqliteItemStore {
    async fn read_changes(&self, consumer: &str, limit: usize) -> Result<Vec<StreamRecord>> {
        let rows = sqlx::query(
            r"
            SELECT seq, event_kind, before_json, after_json, recorded_at
            FROM item_changes
            WHERE seq > COALESCE((SELECT sequence FROM stream_checkpoints WHERE consumer = ?), 0)
            ORDER BY seq
            LIMIT ?
            ",
        )
        .bind(consumer)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<StreamRecord> {
                let event = ChangeEvent {
                    event_kind: row.try_get::<EventKind, _>("event_kind")?,
                    before: decode_snapshot(row.try_get("before_json")?)?,
                    after: decode_snapshot(row.try_get("after_json")?)?,
                };
                Ok(StreamRecord {
                    sequence: row.try_get("seq")?,
                    recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
                    event,
                })
            })
            .collect()
    }

    async fn commit(&self, consumer: &str, sequence: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO stream_checkpoints (consumer, sequence, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(consumer) DO UPDATE SET
                sequence = MAX(stream_checkpoints.sequence, excluded.sequence),
                updated_at = excluded.updated_at
            ",
        )
        .bind(consumer)
        .bind(sequence)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM stream_delivery_failures WHERE consumer = ? AND sequence <= ?")
            .bind(consumer)
            .bind(sequence)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_failure(&self, consumer: &str, sequence: i64, error: &str) -> Result<u32> {
        let _guard = self.write_lock.lock().await;

        let attempts: i64 = sqlx::query_scalar(
            r"
            INSERT INTO stream_delivery_failures (consumer, sequence, attempts, last_error, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(consumer) DO UPDATE SET
                attempts = CASE
                    WHEN stream_delivery_failures.sequence = excluded.sequence
                    THEN stream_delivery_failures.attempts + 1
                    ELSE 1
                END,
                sequence = excluded.sequence,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at
            RETURNING attempts
            ",
        )
        .bind(consumer)
        .bind(sequence)
        .bind(error)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(attempts as u32)
    }
}
