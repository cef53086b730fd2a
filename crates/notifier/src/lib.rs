// In crates/notifier/src/lib.rs

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use app_config::types::SmtpSettings;

pub mod error;
pub mod message;

// Re-export public types
pub use error::{Error, Result};
pub use message::AlertMail;

/// The universal interface for delivering an alert to a person.
///
/// The engine renders the mail itself and hands over finished strings, so a
/// test double only has to record what it was asked to send.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one multipart (plain + HTML) message.
    async fn send(&self, to: &str, subject: &str, text_body: &str, html_body: &str) -> Result<()>;
}

/// [`Notifier`] backed by an SMTP relay with STARTTLS, the setup virtually
/// every mail provider's submission port (587) expects.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Constructs a new SmtpNotifier from SmtpSettings.
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(Duration::from_secs(settings.timeout_secs)))
            .build();
        let from: Mailbox = settings.from.parse()?;
        Ok(SmtpNotifier { transport, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, text_body: &str, html_body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_string(),
                html_body.to_string(),
            ))?;

        self.transport.send(message).await?;
        tracing::debug!(to, subject, "alert mail delivered");
        Ok(())
    }
}
