// Integration tests for Price Monitor
// These tests run the checker and notifier against a real SQLite store and a
// mocked HTTP shop.

pub mod notifier_tests;
pub mod price_check_tests;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_monitor::{
    App, AppConfig, AppError,
    config::{
        DatabaseConfig, FetcherConfig, LoggingConfig, MetricsConfig, NotificationsConfig,
        SchedulerConfig, SmtpConfig, StreamConfig,
    },
    fetcher::HttpFetcher,
    models::NewItem,
    notifier::MailTransport,
    store::SqliteItemStore,
};

/// Test configuration for integration tests
pub fn get_test_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("price-monitor.db").display()),
            max_connections: 2,
        },
        fetcher: FetcherConfig {
            request_timeout: 5,
            user_agent: "PriceMonitor-Test/1.0".to_string(),
        },
        scheduler: SchedulerConfig {
            check_interval: "0 */15 * * * *".to_string(),
            pass_timeout: 10,
        },
        notifications: NotificationsConfig {
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 2525,
                username: None,
                password: None,
                use_tls: false,
            },
            stream: StreamConfig {
                consumer: "price-notifier".to_string(),
                poll_interval_ms: 50,
                batch_size: 1,
                max_delivery_attempts: 2,
            },
        },
        metrics: MetricsConfig {
            enabled: false,
            port: 9001,
        },
        logging: LoggingConfig {
            directory: None,
            file_prefix: "price-monitor.log".to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Mail transport that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(
        &self,
        from: &str,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> price_monitor::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Mail("relay unavailable".to_string()));
        }

        self.sent.lock().await.push(SentMail {
            from: from.to_string(),
            to: to.to_vec(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });
        Ok(())
    }
}

pub struct TestContext {
    pub app: App,
    pub store: Arc<SqliteItemStore>,
    pub mailer: Arc<RecordingMailer>,
    pub server: MockServer,
    _dir: TempDir,
}

impl TestContext {
    pub fn page_url(&self, page: &str) -> String {
        format!("{}/{}", self.server.uri(), page)
    }

    /// Serves `price` inside a `span.price` at `/{page}`, replacing whatever
    /// the shop served before.
    pub async fn serve_price(&self, page: &str, price: &str) {
        self.server.reset().await;
        mount_price(&self.server, page, price).await;
    }

    pub async fn add_item(&self, page: &str, item: &str, price: &str) -> anyhow::Result<String> {
        let item = self
            .app
            .add_item(NewItem {
                url: self.page_url(page),
                selector: "span.price".to_string(),
                item: item.to_string(),
                price: price.to_string(),
                email: "shopper@example.com".to_string(),
            })
            .await?;
        Ok(item.id)
    }
}

pub fn price_page(price: &str) -> String {
    format!(
        "<html><body><h1>Widget</h1><span class=\"price\">{}</span></body></html>",
        price
    )
}

pub async fn mount_price(server: &MockServer, page: &str, price: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(price_page(price)))
        .mount(server)
        .await;
}

/// Create an app backed by a fresh SQLite file, the real HTTP fetcher and a
/// recording mailer
pub async fn create_test_context() -> anyhow::Result<TestContext> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(&dir);

    let store = Arc::new(SqliteItemStore::connect(&config.database).await?);
    let fetcher = Arc::new(HttpFetcher::new(&config.fetcher)?);
    let mailer = Arc::new(RecordingMailer::default());
    let server = MockServer::start().await;

    let app = App::with_parts(config, store.clone(), store.clone(), fetcher, mailer.clone());

    Ok(TestContext {
        app,
        store,
        mailer,
        server,
        _dir: dir,
    })
}
