//! Digest assembly, rendering and delivery.
//!
//! The orchestrator fills a [`DigestBuilder`]; the finalized [`DigestPayload`]
//! goes to a [`DigestSink`] (email, or stdout for dry runs). [`SentHistory`]
//! keeps posts from being delivered twice across runs.

mod email;
mod generator;
mod history;
mod payload;
mod sink;

pub use email::EmailSink;
pub use generator::{DigestRenderer, RenderedDigest};
pub use history::SentHistory;
pub use payload::{
    AccountDigest, AccountFailure, DigestBuilder, DigestPayload, RunLedger, RunOutcome,
};
pub use sink::{DigestSink, StdoutSink};
