//! Scroll-and-scrape timeline fetcher.
//!
//! The loop is an explicit state machine ([`ScrollLoop`]) so each exit
//! condition can be exercised without a browser; [`TimelineFetcher`] drives it
//! against a [`BrowserSession`] and exposes the result as a lazy stream.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use super::parser::{PageSnapshot, PageState, ParsedPost, TimelineParser};
use super::types::{Account, RawPost};
use crate::config::{CollectionConfig, DEFAULT_BASE_URL};
use crate::error::{FetchError, SessionError};
use crate::session::{is_login_url, BrowserSession};

/// Env var naming a directory to dump every extracted snapshot into.
const ENV_DUMP_DIR: &str = "TIMELINE_DUMP_HTML";

/// Tuning for one account's scroll loop.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Max posts collected per account.
    pub max_items: usize,
    /// Recency window in days; reaching older posts ends the loop.
    pub start_days: u32,
    /// Consecutive loads without new posts before giving up.
    pub stall_limit: u32,
    /// Extraction attempts that may find no post structure at all.
    pub extraction_retries: u32,
    /// Wait after each scroll.
    pub scroll_wait: Duration,
    /// Wait after navigating to the timeline.
    pub page_load_wait: Duration,
    /// Hard wall-clock limit for one account.
    pub timeout: Duration,
    /// Platform origin.
    pub base_url: String,
    /// Dump rendered HTML here for inspecting markup changes.
    pub dump_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_items: 100,
            start_days: 1,
            stall_limit: 2,
            extraction_retries: 3,
            scroll_wait: Duration::from_secs(3),
            page_load_wait: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
            base_url: DEFAULT_BASE_URL.to_string(),
            dump_dir: None,
        }
    }
}

impl From<&CollectionConfig> for FetchConfig {
    fn from(c: &CollectionConfig) -> Self {
        Self {
            max_items: c.max_items,
            start_days: c.start_days,
            stall_limit: c.stall_limit,
            extraction_retries: c.extraction_retries,
            scroll_wait: Duration::from_secs(c.scroll_wait_secs),
            page_load_wait: Duration::from_secs(c.page_load_wait_secs),
            timeout: Duration::from_secs(c.timeout_secs),
            base_url: c.base_url.trim_end_matches('/').to_string(),
            dump_dir: std::env::var_os(ENV_DUMP_DIR).map(PathBuf::from),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_items` posts collected.
    Quota,
    /// The batch reached posts older than the window.
    WindowExhausted,
    /// Too many consecutive loads produced nothing new.
    Stalled,
    /// Wall-clock limit reached.
    Timeout,
}

/// Scroll loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    /// Next step: trigger more content.
    Loading,
    /// Next step: read and parse the rendered page.
    Extracting,
    /// The last extraction yielded nothing new.
    Stalled,
    /// Finished.
    Done(StopReason),
}

/// Bookkeeping for one account's scroll loop. Holds no I/O.
#[derive(Debug)]
pub struct ScrollLoop {
    account: String,
    base_url: String,
    max_items: usize,
    stall_limit: u32,
    extraction_retries: u32,
    cutoff: DateTime<Utc>,
    state: ScrollState,
    seen: HashSet<String>,
    collected: usize,
    stalls: u32,
    misses: u32,
}

impl ScrollLoop {
    /// Start a loop for `account`; the page has just been navigated to.
    #[must_use]
    pub fn new(account: &Account, config: &FetchConfig, now: DateTime<Utc>) -> Self {
        Self {
            account: account.username.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_items: config.max_items,
            stall_limit: config.stall_limit.max(1),
            extraction_retries: config.extraction_retries.max(1),
            cutoff: now - ChronoDuration::days(i64::from(config.start_days)),
            state: ScrollState::Extracting,
            seen: HashSet::new(),
            collected: 0,
            stalls: 0,
            misses: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ScrollState {
        self.state
    }

    #[must_use]
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Oldest timestamp still inside the window.
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// `Loading` -> `Extracting` once more content was requested.
    pub fn loaded(&mut self) {
        if self.state == ScrollState::Loading {
            self.state = ScrollState::Extracting;
        }
    }

    /// `Loading` -> `Done(Timeout)` if the deadline has passed. Returns true when it fired.
    pub fn check_deadline(&mut self, elapsed: Duration, timeout: Duration) -> bool {
        if self.state == ScrollState::Loading && elapsed >= timeout {
            self.state = ScrollState::Done(StopReason::Timeout);
            return true;
        }
        false
    }

    /// `Stalled` -> `Loading`, or `Done(Stalled)` once the limit is hit.
    pub fn on_stall(&mut self) {
        if self.state != ScrollState::Stalled {
            return;
        }
        self.stalls += 1;
        self.state = if self.stalls >= self.stall_limit {
            ScrollState::Done(StopReason::Stalled)
        } else {
            ScrollState::Loading
        };
    }

    /// Consume one parsed snapshot in `Extracting`, returning the new posts in timeline order.
    pub fn on_snapshot(&mut self, snapshot: PageSnapshot) -> Result<Vec<RawPost>, FetchError> {
        match snapshot.state {
            PageState::AccountNotFound => {
                return Err(FetchError::AccountNotFound(self.account.clone()));
            }
            PageState::LoginWall => {
                return Err(self.extraction_failure("login wall shown instead of timeline"));
            }
            PageState::Unrecognized if self.collected == 0 => {
                self.misses += 1;
                if self.misses >= self.extraction_retries {
                    return Err(self.extraction_failure(&format!(
                        "post structure absent after {} attempts",
                        self.misses
                    )));
                }
                self.state = ScrollState::Loading;
                return Ok(Vec::new());
            }
            PageState::Unrecognized | PageState::Timeline => {}
        }

        let mut fresh = Vec::new();
        for parsed in snapshot.posts {
            if self.collected + fresh.len() >= self.max_items {
                break;
            }
            if self.seen.insert(parsed.post_id.clone()) {
                fresh.push(self.to_raw(parsed));
            }
        }
        self.collected += fresh.len();

        // Pinned posts sit above newer ones, so they say nothing about how far back we are.
        let oldest = fresh
            .iter()
            .filter(|p| !p.pinned)
            .map(|p| p.posted_at)
            .min();

        self.state = if self.collected >= self.max_items {
            ScrollState::Done(StopReason::Quota)
        } else if oldest.is_some_and(|t| t < self.cutoff) {
            ScrollState::Done(StopReason::WindowExhausted)
        } else if fresh.is_empty() {
            ScrollState::Stalled
        } else {
            self.stalls = 0;
            ScrollState::Loading
        };

        Ok(fresh)
    }

    fn to_raw(&self, parsed: ParsedPost) -> RawPost {
        let url = format!("{}/{}/status/{}", self.base_url, parsed.author, parsed.post_id);
        RawPost {
            account: self.account.clone(),
            post_id: parsed.post_id,
            text: parsed.text,
            posted_at: parsed.posted_at,
            url,
            author: parsed.author,
            pinned: parsed.pinned,
        }
    }

    fn extraction_failure(&self, reason: &str) -> FetchError {
        FetchError::ExtractionFailure {
            username: self.account.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Produces an account's posts for the orchestrator.
#[async_trait]
pub trait TimelineSource: Send {
    /// Read `account`'s timeline, newest first.
    async fn fetch_timeline(&mut self, account: &Account) -> Result<Vec<RawPost>, FetchError>;
}

/// Reads account timelines through one shared browser session.
pub struct TimelineFetcher {
    session: Box<dyn BrowserSession>,
    parser: TimelineParser,
    config: FetchConfig,
}

impl TimelineFetcher {
    #[must_use]
    pub fn new(session: Box<dyn BrowserSession>, config: FetchConfig) -> Self {
        Self {
            session,
            parser: TimelineParser::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Give the session back for teardown.
    #[must_use]
    pub fn into_session(self) -> Box<dyn BrowserSession> {
        self.session
    }

    /// Lazily stream `account`'s posts in timeline order.
    ///
    /// The stream cannot be restarted; it ends after the first error.
    pub fn fetch<'a>(
        &'a mut self,
        account: &'a Account,
    ) -> impl Stream<Item = Result<RawPost, FetchError>> + Send + 'a {
        let cursor = Cursor {
            session: self.session.as_mut(),
            parser: &self.parser,
            config: &self.config,
            account,
            machine: None,
            pending: VecDeque::new(),
            started: Instant::now(),
            snapshots: 0,
            finished: false,
        };
        stream::unfold(cursor, |mut cursor| async move {
            let item = cursor.next().await?;
            Some((item, cursor))
        })
    }
}

#[async_trait]
impl TimelineSource for TimelineFetcher {
    async fn fetch_timeline(&mut self, account: &Account) -> Result<Vec<RawPost>, FetchError> {
        self.fetch(account).try_collect().await
    }
}

/// Drives a [`ScrollLoop`] against the session.
struct Cursor<'a> {
    session: &'a mut dyn BrowserSession,
    parser: &'a TimelineParser,
    config: &'a FetchConfig,
    account: &'a Account,
    machine: Option<ScrollLoop>,
    pending: VecDeque<RawPost>,
    started: Instant,
    snapshots: usize,
    finished: bool,
}

impl Cursor<'_> {
    async fn next(&mut self) -> Option<Result<RawPost, FetchError>> {
        loop {
            if let Some(post) = self.pending.pop_front() {
                return Some(Ok(post));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.advance().await {
                tracing::warn!(username = %self.account.username, error = %e, "Timeline fetch failed");
                self.finished = true;
                return Some(Err(e));
            }
        }
    }

    async fn advance(&mut self) -> Result<(), FetchError> {
        let Some(machine) = self.machine.as_mut() else {
            return self.open().await;
        };

        match machine.state() {
            ScrollState::Loading => {
                if machine.check_deadline(self.started.elapsed(), self.config.timeout) {
                    return Ok(());
                }
                self.session
                    .load_more()
                    .await
                    .map_err(|e| fetch_error(&self.account.username, e))?;
                tokio::time::sleep(self.config.scroll_wait).await;
                machine.loaded();
            }
            ScrollState::Extracting => {
                let html = self
                    .session
                    .content()
                    .await
                    .map_err(|e| fetch_error(&self.account.username, e))?;
                self.snapshots += 1;
                dump_snapshot(self.config, &self.account.username, self.snapshots, &html);

                let snapshot = self.parser.parse(&html);
                let found = snapshot.posts.len();
                let fresh = machine.on_snapshot(snapshot)?;
                tracing::debug!(
                    username = %self.account.username,
                    found,
                    new = fresh.len(),
                    collected = machine.collected(),
                    state = ?machine.state(),
                    "Extracted batch"
                );
                self.pending.extend(fresh);
            }
            ScrollState::Stalled => machine.on_stall(),
            ScrollState::Done(reason) => {
                tracing::info!(
                    username = %self.account.username,
                    collected = machine.collected(),
                    ?reason,
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "Timeline fetch finished"
                );
                self.finished = true;
            }
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<(), FetchError> {
        let username = &self.account.username;
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), username);
        tracing::info!(username = %username, url, "Opening timeline");

        self.started = Instant::now();
        self.session.navigate(&url).await.map_err(|e| match e {
            SessionError::Disconnected(reason) => FetchError::SessionLost {
                username: username.clone(),
                reason,
            },
            SessionError::Page(reason) => FetchError::Navigation {
                url: url.clone(),
                reason,
            },
        })?;
        tokio::time::sleep(self.config.page_load_wait).await;

        let landed = self
            .session
            .current_url()
            .await
            .map_err(|e| fetch_error(username, e))?;
        if is_login_url(&landed) {
            return Err(FetchError::ExtractionFailure {
                username: username.clone(),
                reason: format!("redirected to login ({landed})"),
            });
        }

        self.machine = Some(ScrollLoop::new(self.account, self.config, Utc::now()));
        Ok(())
    }
}

fn fetch_error(username: &str, err: SessionError) -> FetchError {
    match err {
        SessionError::Disconnected(reason) => FetchError::SessionLost {
            username: username.to_string(),
            reason,
        },
        SessionError::Page(reason) => FetchError::ExtractionFailure {
            username: username.to_string(),
            reason,
        },
    }
}

fn dump_snapshot(config: &FetchConfig, username: &str, n: usize, html: &str) {
    let Some(dir) = &config.dump_dir else {
        return;
    };
    let path = dir.join(format!("{username}-{n:03}.html"));
    if let Err(e) = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, html)) {
        tracing::warn!(path = %path.display(), error = %e, "Failed to dump HTML");
    } else {
        tracing::info!(path = %path.display(), "Dumped HTML for inspection");
    }
}
