use crate::config::EmailConfig;
use crate::domain::model::Notification;
use crate::domain::ports::Mailer;
use crate::utils::error::{CertError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers notifications over SMTP. Port 465 uses implicit TLS, any other
/// port upgrades the connection with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let relay = if config.uses_implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        };
        let builder = relay
            .map_err(CertError::transport)?
            .port(config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        let builder = if config.smtp_user.is_empty() {
            builder
        } else {
            builder.credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
        };

        let from = parse_mailbox("email.from", &config.from)?;
        let to = config
            .recipients()
            .map(|address| parse_mailbox("email.to", address))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(notification.body.clone())
            .map_err(CertError::transport)
    }
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| CertError::InvalidConfigValueError {
            field: field.to_string(),
            value: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = self.message(notification)?;
        self.transport
            .send(message)
            .await
            .map_err(CertError::transport)?;
        Ok(())
    }
}
