//! SMTP email channel

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::notifier::{
    alert_title, render_acknowledgement, render_alert, render_all_clear, render_status_report,
    AckNotifier, Acknowledgement, Alert, AllClear, Notifier,
};
use crate::report::StatusReportData;
use crate::VigilError;

/// SMTP relay connection settings
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
}

pub struct EmailNotifier {
    name: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

fn parse_mailbox(address: &str) -> crate::Result<Mailbox> {
    address
        .parse()
        .map_err(|e| VigilError::Config(format!("Invalid email address '{}': {}", address, e)))
}

impl EmailNotifier {
    /// Validates the addresses and prepares a pooled transport; no connection is made yet
    pub fn new(name: &str, smtp: SmtpSettings, from: &str, to: &[String]) -> crate::Result<Self> {
        if to.is_empty() {
            return Err(VigilError::Config(format!(
                "Email channel '{}' has no recipients",
                name
            )));
        }
        let from = parse_mailbox(from)?;
        let to = to
            .iter()
            .map(|address| parse_mailbox(address))
            .collect::<crate::Result<Vec<_>>>()?;

        let builder = if smtp.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host).map_err(|e| {
                VigilError::Config(format!("Invalid SMTP relay '{}': {}", smtp.host, e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };
        let mut builder = builder.port(smtp.port);
        if let (Some(username), Some(password)) = (smtp.username, smtp.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        tracing::debug!(
            "Created EmailNotifier '{}' via {}:{} for {} recipients",
            name,
            smtp.host,
            smtp.port,
            to.len()
        );

        Ok(Self {
            name: name.to_string(),
            from,
            to,
            transport: builder.build(),
        })
    }

    fn build_message(&self, subject: &str, body: String) -> crate::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(body)
            .map_err(|e| VigilError::Notifier(format!("Failed to build email: {}", e)))
    }

    async fn deliver(&self, subject: &str, body: String) -> crate::Result<()> {
        let message = self.build_message(subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| VigilError::Notifier(format!("SMTP delivery failed: {}", e)))?;
        tracing::debug!("Email '{}' sent via '{}'", subject, self.name);
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "email"
    }

    async fn send_alert(&self, alert: &Alert) -> crate::Result<()> {
        self.deliver(&alert_title(alert), render_alert(alert, None))
            .await
    }

    async fn send_all_clear(&self, all_clear: &AllClear) -> crate::Result<()> {
        let subject = format!("[RECOVERED] {}", all_clear.target);
        self.deliver(&subject, render_all_clear(all_clear)).await
    }

    async fn send_status_report(&self, report: &StatusReportData) -> crate::Result<()> {
        self.deliver("Vigil status report", render_status_report(report))
            .await
    }

    fn acknowledgements(&self) -> Option<&dyn AckNotifier> {
        Some(self)
    }
}

#[async_trait]
impl AckNotifier for EmailNotifier {
    async fn send_alert_with_ack(&self, alert: &Alert, ack_url: &str) -> crate::Result<()> {
        self.deliver(&alert_title(alert), render_alert(alert, Some(ack_url)))
            .await
    }

    async fn send_acknowledgement(&self, ack: &Acknowledgement) -> crate::Result<()> {
        let subject = format!("[ACKNOWLEDGED] {}", ack.subject);
        self.deliver(&subject, render_acknowledgement(ack)).await
    }
}
