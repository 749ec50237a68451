pub mod app;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod price_check;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use app::App;
pub use config::AppConfig;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
