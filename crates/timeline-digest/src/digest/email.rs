//! SMTP delivery of the digest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::generator::{DigestRenderer, RenderedDigest};
use super::payload::DigestPayload;
use super::sink::DigestSink;
use crate::config::{EmailConfig, ENV_SMTP_PASSWORD};

/// Emails the digest to the configured recipients.
pub struct EmailSink {
    config: EmailConfig,
    password: Option<String>,
    renderer: DigestRenderer,
}

impl EmailSink {
    #[must_use]
    pub fn new(config: EmailConfig, password: Option<String>) -> Self {
        let renderer = DigestRenderer::new(config.subject_template.clone());
        Self {
            config,
            password,
            renderer,
        }
    }

    /// Create with the SMTP password taken from `SMTP_PASSWORD`.
    pub fn from_env(config: EmailConfig) -> Result<Self> {
        let password = std::env::var(ENV_SMTP_PASSWORD)
            .with_context(|| format!("{ENV_SMTP_PASSWORD} environment variable not set"))?;
        Ok(Self::new(config, Some(password)))
    }

    /// Build the multipart message for a rendered digest.
    pub fn build_message(&self, digest: &RenderedDigest) -> Result<Message> {
        let from: Mailbox = self
            .config
            .sender
            .parse()
            .with_context(|| format!("Invalid sender address: {}", self.config.sender))?;

        if self.config.recipients.is_empty() {
            anyhow::bail!("No email recipients configured");
        }

        let mut builder = Message::builder().from(from).subject(digest.subject.as_str());
        for recipient in &self.config.recipients {
            let to: Mailbox = recipient
                .parse()
                .with_context(|| format!("Invalid recipient address: {recipient}"))?;
            builder = builder.to(to);
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(digest.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(digest.html.clone()),
                    ),
            )
            .context("Failed to build email message")
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .context("Failed to create SMTP transport")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_host)
        };
        let mut builder = builder.port(self.config.smtp_port);

        if let Some(password) = &self.password {
            let username = self
                .config
                .smtp_username
                .clone()
                .unwrap_or_else(|| self.config.sender.clone());
            builder = builder.credentials(Credentials::new(username, password.clone()));
        }
        Ok(builder.build())
    }

    /// Send a rendered digest.
    pub async fn send(&self, digest: &RenderedDigest) -> Result<()> {
        let message = self.build_message(digest)?;
        self.transport()?
            .send(message)
            .await
            .context("Failed to send email via SMTP")?;

        tracing::info!(
            recipients = self.config.recipients.len(),
            subject = %digest.subject,
            "Email sent successfully"
        );
        Ok(())
    }

    /// Send a simple test email to verify configuration.
    pub async fn send_test(&self) -> Result<()> {
        let subject = self.renderer.subject(Local::now().date_naive());
        let digest = RenderedDigest {
            subject: format!("{subject} (test)"),
            html: r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; padding: 20px;">
    <h1 style="color: #0284c7;">Timeline Digest</h1>
    <p><strong>Email configuration is working.</strong></p>
    <p>Scheduled digests will arrive at this address.</p>
</body>
</html>
"#
            .to_string(),
            text: "Timeline Digest\n\nEmail configuration is working.\nScheduled digests will arrive at this address.\n"
                .to_string(),
        };
        self.send(&digest).await
    }
}

#[async_trait]
impl DigestSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, payload: &DigestPayload) -> Result<()> {
        let rendered = self.renderer.render(payload, Local::now().date_naive());
        self.send(&rendered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            subject_template: "AI Daily - {date}".to_string(),
            recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
            sender: "Digest <digest@example.com>".to_string(),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            use_tls: true,
            send_time: "08:00".to_string(),
        }
    }

    fn rendered() -> RenderedDigest {
        RenderedDigest {
            subject: "AI Daily - 2026-03-14".to_string(),
            html: "<p>hi</p>".to_string(),
            text: "hi".to_string(),
        }
    }

    #[test]
    fn test_message_has_all_recipients() {
        let sink = EmailSink::new(config(), None);
        let message = sink.build_message(&rendered()).unwrap();

        let to: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(to, vec!["a@example.com", "b@example.com"]);

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: AI Daily - 2026-03-14"));
        assert!(formatted.contains("multipart/alternative"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let mut cfg = config();
        cfg.recipients.push("not an address".to_string());
        let err = EmailSink::new(cfg, None).build_message(&rendered()).unwrap_err();
        assert!(err.to_string().contains("not an address"));
    }

    #[test]
    fn test_no_recipients_rejected() {
        let mut cfg = config();
        cfg.recipients.clear();
        assert!(EmailSink::new(cfg, None).build_message(&rendered()).is_err());
    }

    #[test]
    fn test_transport_builds_without_tls() {
        let mut cfg = config();
        cfg.use_tls = false;
        cfg.smtp_host = "localhost".to_string();
        assert!(EmailSink::new(cfg, Some("pw".to_string())).transport().is_ok());
    }
}
