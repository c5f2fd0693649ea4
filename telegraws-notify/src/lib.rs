use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use lettre::address::{Address, Envelope};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{Message, SmtpTransport, Transport};
use serde_json::json;
use telegraws_core::Dialect;
use telegraws_core::config::{EmailConfig, NotificationsConfig, TelegramConfig};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const EMAIL_SUBJECT: &str = "Telegraws";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery channel for a rendered report.
pub trait Notifier {
    /// Dialect the channel expects the report body in.
    fn dialect(&self) -> Dialect;
    fn send(&self, body: &str) -> Result<()>;
}

/// Picks email when enabled in the config, the chat bot otherwise.
pub fn notifier_for(config: &NotificationsConfig) -> Result<Box<dyn Notifier>> {
    if config.use_email {
        Ok(Box::new(EmailNotifier::new(&config.email)?))
    } else {
        Ok(Box::new(TelegramNotifier::new(&config.telegram)?))
    }
}

pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, config.bot_token),
            chat_id: config.chat_id.clone(),
        })
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        })
    }
}

impl Notifier for TelegramNotifier {
    fn dialect(&self) -> Dialect {
        Dialect::PlainMarkup
    }

    fn send(&self, body: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.payload(body))
            .send()
            .context("telegram sendMessage request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("telegram API returned HTTP {}: {}", status, text);
        }

        tracing::info!(chat_id = self.chat_id.as_str(), "report sent to telegram");
        Ok(())
    }
}

pub struct EmailNotifier {
    transport: SmtpTransport,
    header_from: String,
    envelope_from: String,
    to_addr: String,
}

impl EmailNotifier {
    /// Prepares an implicit-TLS SMTP transport; no connection is opened until `send`.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let port = u16::try_from(config.port)
            .with_context(|| format!("SMTP port {} out of range", config.port))?;

        let transport = SmtpTransport::relay(&config.host)
            .with_context(|| format!("failed to configure SMTP relay {}", config.host))?
            .port(port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(REQUEST_TIMEOUT))
            .build();

        Ok(Self {
            transport,
            header_from: config.header_from.clone(),
            envelope_from: config.envelope_from.clone(),
            to_addr: config.to_addr.clone(),
        })
    }

    fn build_message(&self, body: &str) -> Result<(Envelope, Message)> {
        let from: Mailbox = self
            .header_from
            .parse()
            .with_context(|| format!("invalid headerFrom `{}`", self.header_from))?;
        let to: Mailbox = self
            .to_addr
            .parse()
            .with_context(|| format!("invalid toAddr `{}`", self.to_addr))?;
        let sender: Address = self
            .envelope_from
            .parse()
            .with_context(|| format!("invalid envelopeFrom `{}`", self.envelope_from))?;

        let envelope = Envelope::new(Some(sender), vec![to.email.clone()])
            .context("failed to build SMTP envelope")?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(EMAIL_SUBJECT)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .context("failed to build email message")?;

        Ok((envelope, message))
    }
}

impl Notifier for EmailNotifier {
    fn dialect(&self) -> Dialect {
        Dialect::Html
    }

    fn send(&self, body: &str) -> Result<()> {
        let (envelope, message) = self.build_message(body)?;
        self.transport
            .send_raw(&envelope, &message.formatted())
            .context("SMTP delivery failed")?;

        tracing::info!(to = self.to_addr.as_str(), "report sent by email");
        Ok(())
    }
}
