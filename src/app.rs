use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::config::AppConfig;
use crate::extractor::parse_selector;
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::models::{MonitoredItem, NewItem};
use crate::notifier::{ChangeStreamWorker, MailTransport, PriceNotifier, SmtpMailer};
use crate::price_check::PriceChecker;
use crate::scheduler::PriceCheckScheduler;
use crate::store::{ChangeFeed, ItemStore, SqliteItemStore};
use crate::utils::error::{AppError, Result};

/// Wires the store, the checker and the notifier together.
pub struct App {
    config: AppConfig,
    store: Arc<dyn ItemStore>,
    feed: Arc<dyn ChangeFeed>,
    checker: Arc<PriceChecker>,
    notifier: PriceNotifier,
}

impl App {
    /// Connects to the configured database and SMTP relay.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(SqliteItemStore::connect(&config.database).await?);
        let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
        let mailer = Arc::new(SmtpMailer::new(&config.notifications.smtp)?);

        info!("Connected to item store at {}", config.database.url);
        Ok(Self::with_parts(config, store.clone(), store, fetcher, mailer))
    }

    pub fn with_parts(
        config: AppConfig,
        store: Arc<dyn ItemStore>,
        feed: Arc<dyn ChangeFeed>,
        fetcher: Arc<dyn PageFetcher>,
        mailer: Arc<dyn MailTransport>,
    ) -> Self {
        let checker = Arc::new(PriceChecker::new(Arc::clone(&store), fetcher));
        let notifier = PriceNotifier::new(mailer);

        Self {
            config,
            store,
            feed,
            checker,
            notifier,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn checker(&self) -> Arc<PriceChecker> {
        Arc::clone(&self.checker)
    }

    pub fn notifier(&self) -> PriceNotifier {
        self.notifier.clone()
    }

    pub fn stream_worker(&self) -> ChangeStreamWorker {
        ChangeStreamWorker::new(
            Arc::clone(&self.feed),
            self.notifier.clone(),
            self.config.notifications.stream.clone(),
        )
    }

    pub async fn scheduler(&self) -> anyhow::Result<PriceCheckScheduler> {
        PriceCheckScheduler::new(self.checker(), self.config.scheduler.clone()).await
    }

    /// Validates and stores a new item. The insert lands on the change
    /// stream like any other write.
    pub async fn add_item(&self, new_item: NewItem) -> Result<MonitoredItem> {
        new_item.validate()?;
        parse_selector(&new_item.selector)?;

        let item = MonitoredItem::new(new_item);
        self.store.put(&item).await?;
        info!("Added item {} ({})", item.id, item.item);
        Ok(item)
    }

    pub async fn list_items(&self) -> Result<Vec<MonitoredItem>> {
        self.store.scan_all().await
    }

    pub async fn get_item(&self, id: &str) -> Result<MonitoredItem> {
        self.store.get(id).await?.ok_or_else(|| AppError::NotFound {
            resource: format!("item {}", id),
        })
    }

    pub async fn remove_item(&self, id: &str) -> Result<MonitoredItem> {
        let item = self.store.remove(id).await?;
        info!("Removed item {} ({})", item.id, item.item);
        Ok(item)
    }
}
