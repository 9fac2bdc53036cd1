//! End-to-end collection runs over scripted browser sessions.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use timeline_digest::config::AppConfig;
use timeline_digest::digest::{DigestRenderer, DigestSink, RunOutcome, SentHistory, StdoutSink};
use timeline_digest::session::{is_login_url, BrowserSession, CookieRecord};
use timeline_digest::timeline::{FetchConfig, TimelineFetcher};
use timeline_digest::{CollectionOrchestrator, RunError, SessionError, SessionMode};

fn tweet(author: &str, id: &str, posted_at: DateTime<Utc>, text: &str) -> String {
    format!(
        r#"<article data-testid="tweet">
  <a href="/{author}/status/{id}"><time datetime="{ts}">now</time></a>
  <div data-testid="tweetText" lang="en">{text}</div>
</article>"#,
        ts = posted_at.to_rfc3339()
    )
}

fn page(tweets: &[String]) -> String {
    format!("<html><body><main>{}</main></body></html>", tweets.join("\n"))
}

/// Browser stand-in serving canned pages per profile URL.
struct ScriptedBrowser {
    pages: HashMap<String, Vec<String>>,
    current: String,
    scroll: usize,
    drop_on: Option<String>,
    dropped: bool,
}

impl ScriptedBrowser {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: String::new(),
            scroll: 0,
            drop_on: None,
            dropped: false,
        }
    }

    fn profile(mut self, username: &str, pages: Vec<String>) -> Self {
        self.pages.insert(format!("https://x.com/{username}"), pages);
        self
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    fn origin(&self) -> SessionMode {
        SessionMode::RemoteDebug
    }

    fn is_valid(&self) -> bool {
        !self.dropped
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        if self.dropped || self.drop_on.as_deref() == Some(url) {
            self.dropped = true;
            return Err(SessionError::Disconnected("websocket closed".to_string()));
        }
        self.current = url.to_string();
        self.scroll = 0;
        Ok(())
    }

    async fn is_authenticated(&self) -> Result<bool, SessionError> {
        Ok(!is_login_url(&self.current))
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        Ok(self.current.clone())
    }

    async fn content(&self) -> Result<String, SessionError> {
        Ok(match self.pages.get(&self.current) {
            Some(pages) if !pages.is_empty() => pages[self.scroll.min(pages.len() - 1)].clone(),
            _ => "<html><body><span>This account doesn't exist</span></body></html>".to_string(),
        })
    }

    async fn load_more(&mut self) -> Result<(), SessionError> {
        self.scroll += 1;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, SessionError> {
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    std::fs::write(
        &path,
        r"
collection:
  platforms: [x]
  max_items: 20
  start_days: 1
  keywords: [LLM]
  scroll_wait_secs: 0
  page_load_wait_secs: 0
  account_delay_secs: 0
accounts:
  - username: openai
    full_name: OpenAI
    keywords: [GPT]
  - username: ghost_account
  - username: '@deepmind'
    keywords: [Gemini]
",
    )
    .unwrap();
    path
}

fn fast_fetch_config(config: &AppConfig) -> FetchConfig {
    FetchConfig {
        scroll_wait: Duration::ZERO,
        page_load_wait: Duration::ZERO,
        dump_dir: None,
        ..FetchConfig::from(&config.collection)
    }
}

#[tokio::test]
async fn test_run_collects_filters_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load(&write_config(dir.path())).unwrap();
    let accounts = config.resolve_accounts(None).unwrap();
    assert_eq!(accounts[2].username, "deepmind");

    let now = Utc::now();
    let browser = ScriptedBrowser::new()
        .profile(
            "openai",
            vec![
                page(&[
                    tweet("openai", "101", now - ChronoDuration::hours(1), "Introducing GPT-next"),
                    tweet("openai", "100", now - ChronoDuration::hours(2), "Office hours today"),
                ]),
                page(&[
                    tweet("openai", "101", now - ChronoDuration::hours(1), "Introducing GPT-next"),
                    tweet("openai", "100", now - ChronoDuration::hours(2), "Office hours today"),
                    tweet("openai", "99", now - ChronoDuration::days(2), "Old LLM post"),
                ]),
            ],
        )
        .profile(
            "deepmind",
            vec![page(&[
                tweet("deepmind", "201", now - ChronoDuration::hours(3), "Gemini and LLM research"),
                tweet("openai", "101", now - ChronoDuration::hours(1), "Introducing GPT-next"),
            ])],
        );

    let mut fetcher = TimelineFetcher::new(Box::new(browser), fast_fetch_config(&config));
    let payload = CollectionOrchestrator::from_config(&config)
        .run(&mut fetcher, &accounts)
        .await
        .unwrap();

    assert_eq!(payload.accounts_attempted, 3);
    assert_eq!(payload.accounts_failed, 1);
    assert_eq!(payload.failures[0].username, "ghost_account");
    assert_eq!(payload.outcome(), RunOutcome::Partial);

    let ids: Vec<&str> = payload.posts().map(|p| p.post_id()).collect();
    assert_eq!(ids, vec!["101", "201"]);
    let deepmind = &payload.groups[1];
    assert_eq!(deepmind.username, "deepmind");
    let matched: Vec<&str> = deepmind.posts[0]
        .matched_keywords
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(matched, vec!["Gemini", "LLM"]);

    let captured = Captured::default();
    let sink = StdoutSink::with_writer(DigestRenderer::new("AI Daily - {date}"), Box::new(captured.clone()));
    sink.deliver(&payload).await.unwrap();
    let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(out.contains("Introducing GPT-next"));
    assert!(out.contains("@ghost_account"));
}

#[tokio::test]
async fn test_lost_session_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load(&write_config(dir.path())).unwrap();
    let accounts = config.resolve_accounts(None).unwrap();

    let mut browser = ScriptedBrowser::new().profile(
        "openai",
        vec![page(&[tweet("openai", "1", Utc::now(), "GPT")])],
    );
    browser.drop_on = Some("https://x.com/ghost_account".to_string());

    let mut fetcher = TimelineFetcher::new(Box::new(browser), fast_fetch_config(&config));
    let err = CollectionOrchestrator::from_config(&config)
        .run(&mut fetcher, &accounts)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::SessionLost(_)));
    assert!(!fetcher.into_session().is_valid());
}

#[tokio::test]
async fn test_rerun_inside_window_skips_sent_posts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::load(&write_config(dir.path())).unwrap();
    config.collection.history_path = dir.path().join("data").join("sent_posts.json");
    let accounts = config.resolve_accounts(None).unwrap();
    let now = Utc::now();

    let first_day = vec![page(&[tweet("openai", "101", now - ChronoDuration::hours(1), "GPT launch")])];
    let second_day = vec![page(&[
        tweet("openai", "102", now - ChronoDuration::minutes(5), "GPT follow-up"),
        tweet("openai", "101", now - ChronoDuration::hours(1), "GPT launch"),
    ])];

    let mut delivered = Vec::new();
    for pages in [first_day, second_day] {
        let mut history = SentHistory::load(&config.collection.history_path).unwrap();
        let browser = ScriptedBrowser::new().profile("openai", pages);
        let mut fetcher = TimelineFetcher::new(Box::new(browser), fast_fetch_config(&config));
        let mut payload = CollectionOrchestrator::from_config(&config)
            .run(&mut fetcher, &accounts)
            .await
            .unwrap();

        history.remove_sent(&mut payload);
        history.record(&payload);
        history.save(&config.collection.history_path).unwrap();
        delivered.push(payload.posts().map(|p| p.post_id().to_string()).collect::<Vec<_>>());
    }

    assert_eq!(delivered, vec![vec!["101"], vec!["102"]]);
}
