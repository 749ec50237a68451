use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::SmtpConfig;
use crate::utils::error::{AppError, Result};

/// Outbound mail seam. One call sends one HTML message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, from: &str, to: &[String], subject: &str, html_body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
        })
    }
}

/// Builds the HTML message handed to the SMTP transport.
pub fn build_message(from: &str, to: &[String], subject: &str, html_body: &str) -> Result<Message> {
    if to.is_empty() {
        return Err(AppError::Mail("no recipients".to_string()));
    }

    let mut builder = Message::builder()
        .from(from.parse::<Mailbox>()?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in to {
        builder = builder.to(recipient.parse::<Mailbox>()?);
    }

    Ok(builder.body(html_body.to_string())?)
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, from: &str, to: &[String], subject: &str, html_body: &str) -> Result<()> {
        let message = build_message(from, to, subject, html_body)?;
        let response = self.transport.send(message).await?;
        debug!("SMTP accepted message: {:?}", response.code());
        Ok(())
    }
}
