//! Posts already delivered by earlier runs.
//!
//! With a window longer than the schedule interval, consecutive runs see the
//! same posts. The history keeps their IDs on disk so each post is sent once.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::DigestPayload;

/// Tracks the IDs of posts that have gone out in a digest.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SentHistory {
    sent_ids: HashSet<String>,
}

impl SentHistory {
    /// Load the history from a JSON file. A missing file is an empty history.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sent history {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse sent history {}", path.display()))
    }

    /// Save the history to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write sent history {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn is_duplicate(&self, post_id: &str) -> bool {
        self.sent_ids.contains(post_id)
    }

    pub fn mark_sent(&mut self, post_id: &str) {
        self.sent_ids.insert(post_id.to_string());
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.sent_ids.len()
    }

    /// Drop posts sent by an earlier run. Groups left empty are removed;
    /// failures are kept. Returns how many posts were dropped.
    pub fn remove_sent(&self, payload: &mut DigestPayload) -> usize {
        let before = payload.total_posts();
        for group in &mut payload.groups {
            group.posts.retain(|p| !self.is_duplicate(p.post_id()));
        }
        payload.groups.retain(|g| !g.posts.is_empty());
        before - payload.total_posts()
    }

    /// Mark every post in a delivered digest as sent.
    pub fn record(&mut self, payload: &DigestPayload) {
        for post in payload.posts() {
            self.mark_sent(post.post_id());
        }
    }
}
