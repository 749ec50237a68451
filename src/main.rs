use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use price_monitor::config::{LoggingConfig, MetricsConfig};
use price_monitor::models::NewItem;
use price_monitor::{App, AppConfig};

#[derive(Parser)]
#[command(name = "price-monitor")]
#[command(version, about = "Scheduled web price checks with change-triggered email alerts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the change-stream notifier until interrupted
    Run,

    /// Run a single price-check pass and exit
    Check,

    /// Deliver every pending change record and exit
    Notify,

    /// Start monitoring a new item
    Add {
        /// Page to fetch
        #[arg(long)]
        url: String,

        /// CSS selector matching the price element
        #[arg(long)]
        selector: String,

        /// Label used in alert emails
        #[arg(long)]
        item: String,

        /// Subscriber address
        #[arg(long)]
        email: String,

        /// Last known price; left empty the first pass records the current one
        #[arg(long, default_value = "")]
        price: String,
    },

    /// List monitored items
    List,

    /// Stop monitoring an item
    Remove {
        /// Item id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    let _guard = init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting price monitor...");
    let app = App::from_config(config).await?;

    match cli.command {
        Commands::Run => run(app).await?,
        Commands::Check => {
            let report = app
                .checker()
                .run_with_deadline(app.config().scheduler.pass_deadline())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Notify => {
            let delivered = app.stream_worker().drain().await?;
            info!("Delivered {} change records", delivered);
        }
        Commands::Add {
            url,
            selector,
            item,
            email,
            price,
        } => {
            let item = app
                .add_item(NewItem {
                    url,
                    selector,
                    item,
                    price,
                    email,
                })
                .await?;
            println!("{}", item.id);
        }
        Commands::List => {
            let items = app.list_items().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Remove { id } => {
            let item = app.remove_item(&id).await?;
            println!("Removed {} ({})", item.id, item.item);
        }
    }

    Ok(())
}

async fn run(app: App) -> Result<()> {
    let mut scheduler = app.scheduler().await?;
    scheduler.start().await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(app.stream_worker().run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    scheduler.shutdown().await?;
    shutdown_tx.send(true)?;
    if let Err(e) = worker.await {
        warn!("Change stream worker ended abnormally: {}", e);
    }

    Ok(())
}

fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive("price_monitor=debug".parse()?);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()?;
    info!("Prometheus exporter listening on port {}", config.port);
    Ok(())
}
