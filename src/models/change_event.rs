use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{EventKind, MonitoredItem};

/// Row-level mutation emitted by the item store's change stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub event_kind: EventKind,
    pub before: Option<MonitoredItem>,
    pub after: Option<MonitoredItem>,
}

/// A change event together with its position in the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord {
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
    pub event: ChangeEvent,
}

impl ChangeEvent {
    pub fn insert(after: MonitoredItem) -> Self {
        Self {
            event_kind: EventKind::Insert,
            before: None,
            after: Some(after),
        }
    }

    pub fn modify(before: MonitoredItem, after: MonitoredItem) -> Self {
        Self {
            event_kind: EventKind::Modify,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn remove(before: MonitoredItem) -> Self {
        Self {
            event_kind: EventKind::Remove,
            before: Some(before),
            after: None,
        }
    }

    /// Id of the row this event belongs to.
    pub fn item_id(&self) -> Option<&str> {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|item| item.id.as_str())
    }
}
