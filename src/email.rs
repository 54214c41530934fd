use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::config::SmtpConfig;

/// Email delivery failure. Logged for operational visibility; never surfaced
/// to the caller of forgot-password.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid mailbox address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp send failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_email(
        &self,
        to: &str,
        reset_url: &str,
        ttl_minutes: i64,
    ) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .build();
        Ok(Self {
            transport,
            from: cfg.from.parse::<Mailbox>()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_reset_email(
        &self,
        to: &str,
        reset_url: &str,
        ttl_minutes: i64,
    ) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>()?)
            .subject("Password Reset Request")
            .header(ContentType::TEXT_HTML)
            .body(reset_email_body(reset_url, ttl_minutes))?;
        self.transport.send(message).await?;
        info!(%to, "password reset email sent");
        Ok(())
    }
}

/// Dev fallback used when no SMTP host is configured: the reset link goes to
/// the log instead of a mailbox.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset_email(
        &self,
        to: &str,
        reset_url: &str,
        _ttl_minutes: i64,
    ) -> Result<(), DeliveryError> {
        info!(%to, %reset_url, "smtp not configured, logging reset link");
        Ok(())
    }
}

fn reset_email_body(reset_url: &str, ttl_minutes: i64) -> String {
    format!(
        r#"<h1>Password Reset Request</h1>
<p>You requested a password reset. Click the link below to reset your password:</p>
<a href="{reset_url}">Reset Password</a>
<p>If you didn't request this, please ignore this email.</p>
<p>This link will expire in {ttl_minutes} minutes.</p>"#
    )
}
