use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::extractor::extract_price;
use crate::fetcher::PageFetcher;
use crate::models::MonitoredItem;
use crate::store::ItemStore;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassReport {
    pub items_scanned: usize,
    pub pages_fetched: usize,
    pub changed_ids: Vec<String>,
    pub total_time_ms: u64,
}

impl PassReport {
    pub fn changes_detected(&self) -> usize {
        self.changed_ids.len()
    }
}

/// One price-check pass over every monitored item: fetch, extract, diff and
/// write back the rows whose price moved.
pub struct PriceChecker {
    store: Arc<dyn ItemStore>,
    fetcher: Arc<dyn PageFetcher>,
    failed_passes: AtomicU64,
}

impl PriceChecker {
    pub fn new(store: Arc<dyn ItemStore>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            store,
            fetcher,
            failed_passes: AtomicU64::new(0),
        }
    }

    /// Runs a pass, abandoning it once `deadline` elapses. Every failure is
    /// counted, whoever triggered the pass.
    pub async fn run_with_deadline(&self, deadline: Duration) -> Result<PassReport> {
        let result = match tokio::time::timeout(deadline, self.run_pass()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::DeadlineExceeded {
                millis: deadline.as_millis() as u64,
            }),
        };

        if let Err(e) = &result {
            warn!("Price check pass failed: {}", e);
            self.failed_passes.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("price_check_failures_total").increment(1);
        }
        result
    }

    /// Passes that failed through `run_with_deadline` since startup.
    pub fn failed_passes(&self) -> u64 {
        self.failed_passes.load(Ordering::SeqCst)
    }

    /// Any fetch, extraction or write failure fails the whole pass. Fetches
    /// are all joined before the first write is issued, so a failed fetch
    /// leaves the store untouched.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let start_time = Instant::now();

        info!("db scan: start");
        let items = self.store.scan_all().await?;
        info!("db scan: end ({} items)", items.len());

        if items.is_empty() {
            info!("No monitored items, nothing to check");
            metrics::counter!("price_check_passes_total").increment(1);
            return Ok(PassReport {
                total_time_ms: start_time.elapsed().as_millis() as u64,
                ..PassReport::default()
            });
        }

        info!("fetch: start");
        let bodies = try_join_all(items.iter().map(|item| self.fetcher.fetch(&item.url))).await?;
        info!("fetch: end");

        let diff = compute_diff(&items, &bodies)?;
        debug!("diff: {:?}", diff);

        if !diff.is_empty() {
            info!("db update: start ({} changed)", diff.len());
            try_join_all(diff.iter().map(|item| self.store.put(item))).await?;
            info!("db update: end");
        }

        let elapsed = start_time.elapsed();
        metrics::counter!("price_check_passes_total").increment(1);
        metrics::counter!("price_check_changes_total").increment(diff.len() as u64);
        metrics::histogram!("price_check_duration_seconds").record(elapsed.as_secs_f64());

        Ok(PassReport {
            items_scanned: items.len(),
            pages_fetched: bodies.len(),
            changed_ids: diff.into_iter().map(|item| item.id).collect(),
            total_time_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Pairs each item with its freshly fetched body and returns full-row copies
/// of the items whose extracted price differs from the stored one.
pub fn compute_diff(items: &[MonitoredItem], bodies: &[String]) -> Result<Vec<MonitoredItem>> {
    if items.len() != bodies.len() {
        return Err(AppError::Internal(format!(
            "{} items but {} fetched pages",
            items.len(),
            bodies.len()
        )));
    }

    let mut diff = Vec::new();
    for (item, body) in items.iter().zip(bodies) {
        let price = extract_price(body, &item.selector)?;
        if price != item.price {
            debug!("Item {} changed: {:?} -> {:?}", item.id, item.price, price);
            diff.push(item.with_price(price));
        }
    }
    Ok(diff)
}
