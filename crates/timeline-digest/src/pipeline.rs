//! Collection pipeline - orchestrates session, fetch, filter and digest assembly for one run.

use chrono::Utc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::digest::{DigestBuilder, DigestPayload, RunLedger};
use crate::error::RunError;
use crate::relevance::RelevanceFilter;
use crate::session::SessionProvider;
use crate::timeline::{Account, FetchConfig, TimelineFetcher, TimelineSource};

/// Runs accounts through fetch and filter, building the digest.
#[derive(Debug, Clone)]
pub struct CollectionOrchestrator {
    filter: RelevanceFilter,
    account_delay: Duration,
}

impl CollectionOrchestrator {
    #[must_use]
    pub fn new(filter: RelevanceFilter, account_delay: Duration) -> Self {
        Self {
            filter,
            account_delay,
        }
    }

    /// Build from the `collection` section.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let collection = &config.collection;
        Self::new(
            RelevanceFilter::new(collection.keywords.iter().cloned(), collection.start_days),
            Duration::from_secs(collection.account_delay_secs),
        )
    }

    /// Collect every account in order and finalize the digest.
    ///
    /// Per-account fetch failures are recorded and skipped. Only a lost session
    /// aborts the run.
    pub async fn run<S>(&self, source: &mut S, accounts: &[Account]) -> Result<DigestPayload, RunError>
    where
        S: TimelineSource + ?Sized,
    {
        let mut ledger = RunLedger::start(Utc::now());
        let mut builder = DigestBuilder::new();

        tracing::info!(accounts = accounts.len(), "Starting collection run");

        for (i, account) in accounts.iter().enumerate() {
            if i > 0 && !self.account_delay.is_zero() {
                tokio::time::sleep(self.account_delay).await;
            }
            self.collect_account(source, account, &mut ledger, &mut builder)
                .await?;
        }

        let payload = builder.finalize(ledger, Utc::now());
        tracing::info!(
            attempted = payload.accounts_attempted,
            failed = payload.accounts_failed,
            posts = payload.total_posts(),
            outcome = %payload.outcome(),
            "Collection run finished"
        );
        Ok(payload)
    }

    async fn collect_account<S>(
        &self,
        source: &mut S,
        account: &Account,
        ledger: &mut RunLedger,
        builder: &mut DigestBuilder,
    ) -> Result<(), RunError>
    where
        S: TimelineSource + ?Sized,
    {
        ledger.record_attempt();
        tracing::info!(username = %account.username, "Collecting account");

        let raw = match source.fetch_timeline(account).await {
            Ok(posts) => posts,
            Err(e) if e.is_fatal() => {
                tracing::error!(username = %account.username, error = %e, "Session lost, aborting run");
                return Err(RunError::SessionLost(e));
            }
            Err(e) => {
                tracing::warn!(
                    username = %account.username,
                    kind = e.kind(),
                    error = %e,
                    "Account failed, continuing"
                );
                ledger.record_failure(&account.username, &e);
                return Ok(());
            }
        };

        let accepted = self.filter.filter(&raw, account);
        let kept = accepted.len();
        let added = builder.add(account, accepted);
        tracing::info!(
            username = %account.username,
            fetched = raw.len(),
            accepted = kept,
            duplicates = kept - added,
            "Account collected"
        );
        Ok(())
    }
}

/// Acquire a session, collect all accounts, and tear the session down.
pub async fn run_collection(
    config: &AppConfig,
    accounts: &[Account],
) -> Result<DigestPayload, RunError> {
    let provider = SessionProvider::new(config.session.clone(), config.collection.base_url.clone());
    let session = provider.acquire().await?;

    let mut fetcher = TimelineFetcher::new(session, FetchConfig::from(&config.collection));
    let result = CollectionOrchestrator::from_config(config)
        .run(&mut fetcher, accounts)
        .await;

    if let Err(e) = fetcher.into_session().close().await {
        tracing::warn!(error = %e, "Failed to close browser session");
    }
    result
}
