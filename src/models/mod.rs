use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod change_event;
pub mod item;

// Re-exports for convenience
pub use change_event::*;
pub use item::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum EventKind {
    #[sqlx(rename = "insert")]
    Insert,
    #[sqlx(rename = "modify")]
    Modify,
    #[sqlx(rename = "remove")]
    Remove,
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
