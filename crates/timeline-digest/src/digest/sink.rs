//! Digest delivery targets.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::io::Write;
use std::sync::Mutex;

use super::generator::DigestRenderer;
use super::payload::DigestPayload;

/// Consumes the finalized digest of a run.
#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Deliver the digest. Empty digests are delivered too.
    async fn deliver(&self, payload: &DigestPayload) -> Result<()>;
}

/// Writes the plain-text rendering to a writer (stdout by default).
pub struct StdoutSink {
    renderer: DigestRenderer,
    json: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdoutSink {
    #[must_use]
    pub fn new(renderer: DigestRenderer) -> Self {
        Self::with_writer(renderer, Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn with_writer(renderer: DigestRenderer, out: Box<dyn Write + Send>) -> Self {
        Self {
            renderer,
            json: false,
            out: Mutex::new(out),
        }
    }

    /// Print the payload as JSON instead of text.
    #[must_use]
    pub fn json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }
}

#[async_trait]
impl DigestSink for StdoutSink {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn deliver(&self, payload: &DigestPayload) -> Result<()> {
        let body = if self.json {
            serde_json::to_string_pretty(payload)?
        } else {
            let rendered = self.renderer.render(payload, Self::today());
            format!("Subject: {}\n\n{}", rendered.subject, rendered.text)
        };

        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("output writer poisoned"))?;
        writeln!(out, "{body}")?;
        out.flush()?;
        Ok(())
    }
}
