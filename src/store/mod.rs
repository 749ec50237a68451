use async_trait::async_trait;

use crate::models::{MonitoredItem, StreamRecord};
use crate::utils::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryItemStore;
pub use sqlite::SqliteItemStore;

/// Durable table of monitored items keyed by id.
///
/// Every mutation that changes a row is also appended to the change stream
/// exposed through [`ChangeFeed`]. A `put` that leaves the row identical
/// records nothing.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn scan_all(&self) -> Result<Vec<MonitoredItem>>;
    async fn get(&self, id: &str) -> Result<Option<MonitoredItem>>;
    /// Inserts or fully replaces the row with `item.id`.
    async fn put(&self, item: &MonitoredItem) -> Result<()>;
    async fn remove(&self, id: &str) -> Result<MonitoredItem>;
}

/// Ordered, at-least-once feed of row mutations.
///
/// Consumers read past their last committed sequence; the checkpoint never
/// moves backwards.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn read_changes(&self, consumer: &str, limit: usize) -> Result<Vec<StreamRecord>>;
    /// Advances the checkpoint and clears failures recorded up to `sequence`.
    async fn commit(&self, consumer: &str, sequence: i64) -> Result<()>;
    /// Counts a failed delivery of the record at `sequence` and returns the
    /// consecutive attempts made on it so far.
    async fn record_failure(&self, consumer: &str, sequence: i64, error: &str) -> Result<u32>;
}
