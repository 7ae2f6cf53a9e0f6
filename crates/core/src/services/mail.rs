//! Outbound mail.
//!
//! A single [`Mailer`] is built at startup and shared as `Arc<dyn Mailer>`.
//! Delivery failures are reported to the caller as [`SendError`] and are never
//! turned into a request failure.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use thiserror::Error;

use khidmat_common::config::EmailConfig;

/// Identifier assigned to a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mail delivery error.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Mail-sending capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message with plain-text and HTML alternatives.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<MessageId, SendError>;
}

/// SMTP mailer over an async lettre transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    domain: String,
}

impl SmtpMailer {
    /// Build the transport from configuration. Uses STARTTLS on the relay.
    pub fn new(config: &EmailConfig) -> Result<Self, SendError> {
        let address = config
            .from_address
            .parse()
            .map_err(|_| SendError::InvalidAddress(config.from_address.clone()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| SendError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let domain = config
            .from_address
            .rsplit_once('@')
            .map_or_else(|| "localhost".to_string(), |(_, d)| d.to_string());

        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(Some(config.from_name.clone()), address),
            domain,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<MessageId, SendError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| SendError::InvalidAddress(recipient.to_string()))?;

        let id = format!("<{}@{}>", ulid::Ulid::new().to_string().to_lowercase(), self.domain);

        let message = Message::builder()
            .message_id(Some(id.clone()))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_string(),
                html_body.to_string(),
            ))
            .map_err(|e| SendError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        tracing::info!(to = %recipient, message_id = %id, "Email sent");
        Ok(MessageId(id))
    }
}

/// Mailer used when no SMTP relay is configured. Logs and succeeds.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _text_body: &str,
        _html_body: &str,
    ) -> Result<MessageId, SendError> {
        let id = format!("<{}@localhost>", ulid::Ulid::new().to_string().to_lowercase());
        tracing::info!(
            to = %recipient,
            subject = %subject,
            message_id = %id,
            "Email not configured, message logged only"
        );
        Ok(MessageId(id))
    }
}

/// Subject, text and HTML of the welcome email sent to new members.
#[must_use]
pub fn welcome_email(
    name: &str,
    its_id: &str,
    password: &str,
    login_url: Option<&str>,
) -> (String, String, String) {
    let subject = "Welcome to Khidmat".to_string();

    let login_line = login_url.map_or_else(String::new, |url| format!("\nSign in at: {url}\n"));
    let text = format!(
        "Salaam {name},\n\n\
        An account has been created for you.\n\n\
        ITS ID: {its_id}\n\
        Password: {password}\n\
        {login_line}\n\
        Please change your password after signing in."
    );

    let login_html = login_url.map_or_else(String::new, |url| {
        format!("<p><a href=\"{url}\">Sign in</a></p>")
    });
    let html = format!(
        "<p>Salaam {name},</p>\
        <p>An account has been created for you.</p>\
        <p>ITS ID: <strong>{its_id}</strong><br>Password: <strong>{password}</strong></p>\
        {login_html}\
        <p>Please change your password after signing in.</p>"
    );

    (subject, text, html)
}
