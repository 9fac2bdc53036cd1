//! Timeline digest: collects recent posts from monitored X accounts, keeps the
//! ones matching configured keywords, and delivers them as a daily email.
//!
//! This crate provides:
//! - Browser session acquisition (remote debugging or cookie replay)
//! - A scroll-and-scrape timeline fetcher
//! - Keyword and recency filtering
//! - Digest assembly, rendering and SMTP delivery
//! - A sent-post history so posts are delivered once
//! - Daily scheduling

pub mod config;
pub mod digest;
pub mod error;
pub mod pipeline;
pub mod relevance;
pub mod schedule;
pub mod session;
pub mod timeline;

// Re-export main types
pub use config::{AppConfig, CollectionConfig, EmailConfig, SessionConfig, SessionMode};
pub use digest::{
    DigestPayload, DigestRenderer, DigestSink, EmailSink, RunOutcome, SentHistory, StdoutSink,
};
pub use error::{AuthError, FetchError, RunError, SessionError};
pub use pipeline::{run_collection, CollectionOrchestrator};
pub use relevance::RelevanceFilter;
pub use session::{BrowserSession, SessionProvider};
pub use timeline::{AcceptedPost, Account, RawPost, TimelineFetcher, TimelineSource};
