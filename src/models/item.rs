use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::generate_id;

/// One tracked price. The price is kept verbatim as extracted from the page.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct MonitoredItem {
    pub id: String,
    pub url: String,
    pub selector: String,
    pub item: String,
    pub price: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewItem {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1, message = "selector must not be empty"))]
    pub selector: String,
    #[validate(length(min = 1, message = "item label must not be empty"))]
    pub item: String,
    pub price: String,
    #[validate(email)]
    pub email: String,
}

impl MonitoredItem {
    pub fn new(new_item: NewItem) -> Self {
        Self {
            id: generate_id(),
            url: new_item.url,
            selector: new_item.selector,
            item: new_item.item,
            price: new_item.price,
            email: new_item.email,
        }
    }

    /// Full-row copy carrying a freshly extracted price.
    pub fn with_price(&self, price: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            ..self.clone()
        }
    }
}
