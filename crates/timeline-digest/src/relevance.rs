//! Keyword and recency filtering of raw posts.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

use crate::timeline::{AcceptedPost, Account, RawPost};

/// Keeps posts that are recent and mention at least one configured keyword.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    global_keywords: BTreeSet<String>,
    start_days: u32,
}

impl RelevanceFilter {
    /// Create a filter with the run-wide keywords and window.
    #[must_use]
    pub fn new(global_keywords: impl IntoIterator<Item = String>, start_days: u32) -> Self {
        Self {
            global_keywords: global_keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            start_days,
        }
    }

    #[must_use]
    pub fn global_keywords(&self) -> &BTreeSet<String> {
        &self.global_keywords
    }

    /// Filter against the current time.
    #[must_use]
    pub fn filter(&self, posts: &[RawPost], account: &Account) -> Vec<AcceptedPost> {
        self.filter_at(posts, account, Utc::now())
    }

    /// Filter against an explicit `now`.
    ///
    /// A post is kept when `now - start_days <= posted_at <= now` and its text contains
    /// (case-insensitively) any keyword from the account's set or the global set.
    /// Input order is preserved.
    #[must_use]
    pub fn filter_at(
        &self,
        posts: &[RawPost],
        account: &Account,
        now: DateTime<Utc>,
    ) -> Vec<AcceptedPost> {
        let cutoff = now - Duration::days(i64::from(self.start_days));
        let keywords: Vec<(&String, String)> = account
            .keywords
            .iter()
            .chain(&self.global_keywords)
            .map(|k| (k, k.to_lowercase()))
            .collect();

        let accepted: Vec<AcceptedPost> = posts
            .iter()
            .filter(|post| post.posted_at >= cutoff && post.posted_at <= now)
            .filter_map(|post| {
                let text = post.text.to_lowercase();
                let matched: BTreeSet<String> = keywords
                    .iter()
                    .filter(|(_, lower)| text.contains(lower.as_str()))
                    .map(|(original, _)| (*original).clone())
                    .collect();
                (!matched.is_empty()).then(|| AcceptedPost {
                    post: post.clone(),
                    matched_keywords: matched,
                })
            })
            .collect();

        tracing::debug!(
            username = %account.username,
            raw = posts.len(),
            accepted = accepted.len(),
            %cutoff,
            "Filtered posts"
        );
        accepted
    }
}

/// Free-function form of [`RelevanceFilter::filter_at`].
#[must_use]
pub fn filter_posts(
    posts: &[RawPost],
    account: &Account,
    global_keywords: &[String],
    start_days: u32,
    now: DateTime<Utc>,
) -> Vec<AcceptedPost> {
    RelevanceFilter::new(global_keywords.iter().cloned(), start_days).filter_at(posts, account, now)
}
