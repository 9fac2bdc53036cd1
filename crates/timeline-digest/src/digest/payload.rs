//! The digest a run hands to its sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::FetchError;
use crate::timeline::{AcceptedPost, Account};

/// An account whose timeline could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFailure {
    pub username: String,
    /// Short machine-readable category, e.g. `account_not_found`.
    pub kind: String,
    pub reason: String,
}

/// Accepted posts of one account, in timeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDigest {
    pub username: String,
    pub display_name: String,
    pub posts: Vec<AcceptedPost>,
}

/// How a run went, for reporting and exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every attempted account failed.
    AllFailed,
    /// Timelines were read but nothing matched.
    NothingMatched,
    /// Posts were collected but some accounts failed.
    Partial,
    /// Posts collected and no account failed.
    Complete,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllFailed => write!(f, "all accounts failed"),
            Self::NothingMatched => write!(f, "nothing matched"),
            Self::Partial => write!(f, "partial"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Finalized digest of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestPayload {
    pub run_started_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    pub accounts_attempted: usize,
    pub accounts_failed: usize,
    pub failures: Vec<AccountFailure>,
    /// Only accounts that contributed posts, in configured order.
    pub groups: Vec<AccountDigest>,
}

impl DigestPayload {
    #[must_use]
    pub fn total_posts(&self) -> usize {
        self.groups.iter().map(|g| g.posts.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_posts() == 0
    }

    /// All accepted posts in digest order.
    pub fn posts(&self) -> impl Iterator<Item = &AcceptedPost> {
        self.groups.iter().flat_map(|g| g.posts.iter())
    }

    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if self.accounts_attempted > 0 && self.accounts_failed == self.accounts_attempted {
            RunOutcome::AllFailed
        } else if self.is_empty() {
            RunOutcome::NothingMatched
        } else if self.accounts_failed > 0 {
            RunOutcome::Partial
        } else {
            RunOutcome::Complete
        }
    }

    /// Matched keywords by number of posts, most frequent first (ties alphabetical).
    #[must_use]
    pub fn keyword_frequency(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for post in self.posts() {
            for keyword in &post.matched_keywords {
                *counts.entry(keyword.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> =
            counts.into_iter().map(|(k, n)| (k.to_string(), n)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

/// Run bookkeeping threaded through the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLedger {
    pub run_started_at: DateTime<Utc>,
    pub accounts_attempted: usize,
    pub failures: Vec<AccountFailure>,
}

impl RunLedger {
    #[must_use]
    pub fn start(run_started_at: DateTime<Utc>) -> Self {
        Self {
            run_started_at,
            accounts_attempted: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_attempt(&mut self) {
        self.accounts_attempted += 1;
    }

    pub fn record_failure(&mut self, username: &str, error: &FetchError) {
        self.failures.push(AccountFailure {
            username: username.to_string(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        });
    }

    #[must_use]
    pub fn accounts_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Accumulates accepted posts across accounts, dropping repeated post IDs.
#[derive(Debug, Default)]
pub struct DigestBuilder {
    seen: HashSet<String>,
    groups: Vec<AccountDigest>,
}

impl DigestBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one account's accepted posts. Posts already contributed by an
    /// earlier account are skipped. Returns how many were added.
    pub fn add(&mut self, account: &Account, posts: Vec<AcceptedPost>) -> usize {
        let fresh: Vec<AcceptedPost> = posts
            .into_iter()
            .filter(|p| self.seen.insert(p.post.post_id.clone()))
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.groups.push(AccountDigest {
                username: account.username.clone(),
                display_name: account.display_name.clone(),
                posts: fresh,
            });
        }
        added
    }

    #[must_use]
    pub fn post_count(&self) -> usize {
        self.seen.len()
    }

    /// Seal the digest. Consumes the builder so it can only happen once.
    #[must_use]
    pub fn finalize(self, ledger: RunLedger, finalized_at: DateTime<Utc>) -> DigestPayload {
        DigestPayload {
            run_started_at: ledger.run_started_at,
            finalized_at,
            accounts_attempted: ledger.accounts_attempted,
            accounts_failed: ledger.failures.len(),
            failures: ledger.failures,
            groups: self.groups,
        }
    }
}
