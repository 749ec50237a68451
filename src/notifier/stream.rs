use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{NotifyOutcome, PriceNotifier};
use crate::config::StreamConfig;
use crate::models::ChangeEvent;
use crate::store::ChangeFeed;
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing pending for this consumer.
    Idle,
    /// The batch ending at `through` was handled and committed.
    Handled { through: i64, outcome: NotifyOutcome },
    /// The batch kept failing and was committed without being handled.
    Dropped { through: i64 },
}

/// Delivers change-stream records to the notifier, one batch at a time.
///
/// The checkpoint advances only after a batch is handled, so a failed batch
/// is redelivered on the next poll until `max_delivery_attempts` is reached.
/// Attempts are counted by the feed, so they carry over between workers.
pub struct ChangeStreamWorker {
    feed: Arc<dyn ChangeFeed>,
    notifier: PriceNotifier,
    config: StreamConfig,
}

impl ChangeStreamWorker {
    pub fn new(feed: Arc<dyn ChangeFeed>, notifier: PriceNotifier, config: StreamConfig) -> Self {
        Self {
            feed,
            notifier,
            config,
        }
    }

    pub async fn poll_once(&mut self) -> Result<Delivery> {
        let records = self
            .feed
            .read_changes(&self.config.consumer, self.config.batch_size)
            .await?;

        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(Delivery::Idle);
        };
        let (first_sequence, through) = (first.sequence, last.sequence);

        let events: Vec<ChangeEvent> = records.into_iter().map(|record| record.event).collect();
        match self.notifier.handle_batch(&events).await {
            Ok(outcome) => {
                self.feed.commit(&self.config.consumer, through).await?;
                debug!("Delivered change records through {}: {:?}", through, outcome);
                Ok(Delivery::Handled { through, outcome })
            }
            Err(e) => {
                let attempts = self
                    .feed
                    .record_failure(&self.config.consumer, first_sequence, &e.to_string())
                    .await?;

                if attempts >= self.config.max_delivery_attempts {
                    error!(
                        "Giving up on change record {} after {} attempts: {}",
                        first_sequence, attempts, e
                    );
                    self.feed.commit(&self.config.consumer, through).await?;
                    return Ok(Delivery::Dropped { through });
                }

                warn!(
                    "Delivery of change record {} failed (attempt {}/{}): {}",
                    first_sequence, attempts, self.config.max_delivery_attempts, e
                );
                Err(e)
            }
        }
    }

    /// Drains everything currently pending and returns how many batches were
    /// handled or dropped. Stops at the first failing batch.
    pub async fn drain(&mut self) -> Result<usize> {
        let mut delivered = 0;
        loop {
            match self.poll_once().await? {
                Delivery::Idle => return Ok(delivered),
                Delivery::Handled { .. } | Delivery::Dropped { .. } => delivered += 1,
            }
        }
    }

    /// Polls until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Change stream worker started for consumer '{}'",
            self.config.consumer
        );
        let mut interval = tokio::time::interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.drain().await {
                        error!("Change stream delivery failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Change stream worker stopped");
    }
}
