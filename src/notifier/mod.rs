use askama::Template;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{ChangeEvent, EventKind};
use crate::utils::error::{AppError, Result};

pub mod mail;
pub mod stream;

pub use mail::{MailTransport, SmtpMailer};
pub use stream::ChangeStreamWorker;

#[derive(Template)]
#[template(path = "price_alert.html")]
struct PriceAlertTemplate<'a> {
    item: &'a str,
    url: &'a str,
    old_price: &'a str,
    new_price: &'a str,
}

/// Everything needed to tell a subscriber that a price moved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceAlert {
    pub item: String,
    pub url: String,
    pub old_price: String,
    pub new_price: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotModify(EventKind),
    PriceUnchanged,
    EmptyBatch,
}

/// What a change event calls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    Send(PriceAlert),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    Skipped(SkipReason),
}

impl PriceAlert {
    /// Turns a stream event into an alert. Only `modify` events whose price
    /// actually moved produce one.
    pub fn from_event(event: &ChangeEvent) -> Result<AlertDecision> {
        if event.event_kind != EventKind::Modify {
            return Ok(AlertDecision::Skip(SkipReason::NotModify(event.event_kind)));
        }

        let (before, after) = match (&event.before, &event.after) {
            (Some(before), Some(after)) => (before, after),
            _ => {
                return Err(AppError::MalformedEvent(
                    "modify event without both snapshots".to_string(),
                ));
            }
        };

        if before.price == after.price {
            return Ok(AlertDecision::Skip(SkipReason::PriceUnchanged));
        }

        Ok(AlertDecision::Send(Self {
            item: after.item.clone(),
            url: after.url.clone(),
            old_price: before.price.clone(),
            new_price: after.price.clone(),
            email: after.email.clone(),
        }))
    }

    pub fn subject(&self) -> String {
        format!("💰 Price alert - {}", self.item)
    }

    pub fn render_html(&self) -> Result<String> {
        let template = PriceAlertTemplate {
            item: &self.item,
            url: &self.url,
            old_price: &self.old_price,
            new_price: &self.new_price,
        };
        Ok(template.render()?)
    }
}

/// Reacts to item-store changes by mailing the subscriber of the item.
#[derive(Clone)]
pub struct PriceNotifier {
    mailer: Arc<dyn MailTransport>,
}

impl PriceNotifier {
    pub fn new(mailer: Arc<dyn MailTransport>) -> Self {
        Self { mailer }
    }

    /// Handles one delivery. Deliveries are expected to carry a single
    /// record; anything past the first one is ignored.
    pub async fn handle_batch(&self, events: &[ChangeEvent]) -> Result<NotifyOutcome> {
        let Some(first) = events.first() else {
            return Ok(NotifyOutcome::Skipped(SkipReason::EmptyBatch));
        };

        if events.len() > 1 {
            warn!(
                "Delivery carried {} records, only the first is inspected",
                events.len()
            );
        }

        self.handle_event(first).await
    }

    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<NotifyOutcome> {
        let alert = match PriceAlert::from_event(event)? {
            AlertDecision::Send(alert) => alert,
            AlertDecision::Skip(reason) => {
                debug!("Skipping change event: {:?}", reason);
                metrics::counter!("notifications_skipped_total").increment(1);
                return Ok(NotifyOutcome::Skipped(reason));
            }
        };

        let html_body = alert.render_html()?;
        let recipients = [alert.email.clone()];

        info!("email send: start ({})", alert.item);
        if let Err(e) = self
            .mailer
            .send(&alert.email, &recipients, &alert.subject(), &html_body)
            .await
        {
            metrics::counter!("notifications_failed_total").increment(1);
            return Err(e);
        }
        info!("email send: end");

        metrics::counter!("notifications_sent_total").increment(1);
        Ok(NotifyOutcome::Sent)
    }
}
