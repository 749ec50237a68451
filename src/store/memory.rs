use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{ChangeFeed, ItemStore};
use crate::models::{ChangeEvent, MonitoredItem, StreamRecord};
use crate::utils::error::{AppError, Result};

#[derive(Default)]
struct State {
    items: BTreeMap<String, MonitoredItem>,
    log: Vec<StreamRecord>,
    checkpoints: HashMap<String, i64>,
    failures: HashMap<String, (i64, u32)>,
}

/// Process-local store used by tests and dry runs.
#[derive(Default)]
pub struct MemoryItemStore {
    state: RwLock<State>,
    puts: AtomicUsize,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows without recording change events.
    pub async fn with_items(items: impl IntoIterator<Item = MonitoredItem>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().await;
            for item in items {
                state.items.insert(item.id.clone(), item);
            }
        }
        store
    }

    /// Number of `put` calls served so far, changed or not.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Every change recorded so far, regardless of consumer checkpoints.
    pub async fn change_log(&self) -> Vec<StreamRecord> {
        self.state.read().await.log.clone()
    }
}

impl State {
    fn append(&mut self, event: ChangeEvent) {
        let sequence = self.log.last().map(|r| r.sequence).unwrap_or(0) + 1;
        self.log.push(StreamRecord {
            sequence,
            recorded_at: Utc::now(),
            event,
        });
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn scan_all(&self) -> Result<Vec<MonitoredItem>> {
        Ok(self.state.read().await.items.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<Option<MonitoredItem>> {
        Ok(self.state.read().await.items.get(id).cloned())
    }

    async fn put(&self, item: &MonitoredItem) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;

        let event = match state.items.insert(item.id.clone(), item.clone()) {
            Some(before) if before == *item => return Ok(()),
            Some(before) => ChangeEvent::modify(before, item.clone()),
            None => ChangeEvent::insert(item.clone()),
        };
        state.append(event);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<MonitoredItem> {
        let mut state = self.state.write().await;
        let before = state.items.remove(id).ok_or_else(|| AppError::NotFound {
            resource: format!("item {}", id),
        })?;
        state.append(ChangeEvent::remove(before.clone()));
        Ok(before)
    }
}

#[async_trait]
impl ChangeFeed for MemoryItemStore {
    async fn read_changes(&self, consumer: &str, limit: usize) -> Result<Vec<StreamRecord>> {
        let state = self.state.read().await;
        let checkpoint = state.checkpoints.get(consumer).copied().unwrap_or(0);

        Ok(state
            .log
            .iter()
            .filter(|record| record.sequence > checkpoint)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn commit(&self, consumer: &str, sequence: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let checkpoint = state.checkpoints.entry(consumer.to_string()).or_insert(0);
        *checkpoint = (*checkpoint).max(sequence);

        if matches!(state.failures.get(consumer), Some((failed, _)) if *failed <= sequence) {
            state.failures.remove(consumer);
        }
        Ok(())
    }

    async fn record_failure(&self, consumer: &str, sequence: i64, _error: &str) -> Result<u32> {
        let mut state = self.state.write().await;
        let entry = state
            .failures
            .entry(consumer.to_string())
            .or_insert((sequence, 0));
        if entry.0 != sequence {
            *entry = (sequence, 0);
        }
        entry.1 += 1;
        Ok(entry.1)
    }
}
