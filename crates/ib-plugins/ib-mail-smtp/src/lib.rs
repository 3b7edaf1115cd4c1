//! # ib-mail-smtp
//!
//! SMTP implementation of `Notifier`, used to mail post owners their admin PIN.

use async_trait::async_trait;
use ib_core::traits::Notifier;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tracing::{error, info, warn};

/// Connection details for the outbound relay.
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    /// Without credentials the relay is reached in plain text (local catchers such as MailHog).
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(options: SmtpOptions) -> anyhow::Result<Self> {
        let from: Mailbox = options.from.parse()?;

        let transport = match (options.username, options.password) {
            (Some(username), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&options.host)?
                    .port(options.port)
                    .credentials(Credentials::new(
                        username,
                        password.expose_secret().to_owned(),
                    ))
                    .build()
            }
            _ => {
                warn!(host = %options.host, "smtp relay configured without credentials, using plain connection");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&options.host)
                    .port(options.port)
                    .build()
            }
        };

        Ok(Self { transport, from })
    }

    fn compose(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<Message> {
        let to: Mailbox = to.parse()?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())?;
        Ok(message)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> bool {
        let message = match self.compose(to, subject, body) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "could not build email");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                info!(code = %response.code(), "email accepted by relay");
                true
            }
            Err(e) => {
                error!(error = %e, "error sending email with smtp");
                false
            }
        }
    }
}
