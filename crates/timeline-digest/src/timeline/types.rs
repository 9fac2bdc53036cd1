//! Timeline data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A monitored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Platform handle (without @).
    pub username: String,
    /// Display name.
    pub display_name: String,
    /// Account-specific keywords.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl Account {
    /// Create a new account. Blank keywords are dropped.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        display_name: impl Into<String>,
        keywords: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            username: username.into(),
            display_name: display_name.into(),
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Get the handle with @ prefix.
    #[must_use]
    pub fn at_handle(&self) -> String {
        format!("@{}", self.username)
    }
}

/// A post as extracted from a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPost {
    /// Username of the monitored account whose timeline yielded the post.
    pub account: String,
    /// Platform-unique post ID.
    pub post_id: String,
    /// Post text.
    pub text: String,
    /// When the post was published.
    pub posted_at: DateTime<Utc>,
    /// Canonical post URL.
    pub url: String,
    /// Handle of the post author (differs from `account` for reposts).
    pub author: String,
    /// Pinned to the top of the timeline, so exempt from chronological order.
    #[serde(default)]
    pub pinned: bool,
}

impl RawPost {
    /// Whether the post was authored by someone other than the timeline owner.
    #[must_use]
    pub fn is_repost(&self) -> bool {
        !self.author.eq_ignore_ascii_case(&self.account)
    }
}

/// A post that passed relevance filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPost {
    #[serde(flatten)]
    pub post: RawPost,
    /// Every configured keyword found in the text.
    pub matched_keywords: BTreeSet<String>,
}

impl AcceptedPost {
    #[must_use]
    pub fn post_id(&self) -> &str {
        &self.post.post_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_drops_blank_keywords() {
        let account = Account::new(
            "a",
            "A",
            vec!["GPT".to_string(), "  ".to_string(), " LLM ".to_string()],
        );
        assert_eq!(account.keywords.len(), 2);
        assert!(account.keywords.contains("LLM"));
        assert_eq!(account.at_handle(), "@a");
    }

    #[test]
    fn test_repost_detection() {
        let post = RawPost {
            account: "alice".to_string(),
            post_id: "1".to_string(),
            text: "hi".to_string(),
            posted_at: Utc::now(),
            url: "https://x.com/bob/status/1".to_string(),
            author: "bob".to_string(),
            pinned: false,
        };
        assert!(post.is_repost());

        let own = RawPost {
            author: "Alice".to_string(),
            ..post
        };
        assert!(!own.is_repost());
    }
}
