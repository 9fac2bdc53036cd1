//! Timeline page HTML parser.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

/// Markers X renders for a handle that does not exist.
const NOT_FOUND_MARKERS: [&str; 2] = ["This account doesn’t exist", "This account doesn't exist"];

/// What the rendered page turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Post containers are present.
    Timeline,
    /// The nonexistent-account placeholder.
    AccountNotFound,
    /// A login wall or sign-in interstitial instead of posts.
    LoginWall,
    /// No recognizable structure (still rendering, schema drift, or block page).
    Unrecognized,
}

/// A post extracted from page markup, before it is bound to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPost {
    pub post_id: String,
    pub author: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub pinned: bool,
}

/// Result of parsing one rendered snapshot of a timeline.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub state: PageState,
    /// Posts in document (timeline) order.
    pub posts: Vec<ParsedPost>,
    /// Containers dropped for missing link, timestamp or text.
    pub skipped: usize,
}

/// Parser for X profile timeline HTML.
pub struct TimelineParser {
    tweet: Selector,
    article: Selector,
    status_link: Selector,
    time: Selector,
    text: Selector,
    lang_text: Selector,
    social_context: Selector,
    login: Selector,
}

impl Default for TimelineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineParser {
    /// Build the parser; selectors are static and known-valid.
    #[must_use]
    pub fn new() -> Self {
        let parse = |s: &str| Selector::parse(s).expect("static selector");
        Self {
            tweet: parse("article[data-testid='tweet']"),
            article: parse("article"),
            status_link: parse("a[href*='/status/']"),
            time: parse("time[datetime]"),
            text: parse("[data-testid='tweetText']"),
            lang_text: parse("div[lang]"),
            social_context: parse("[data-testid='socialContext']"),
            login: parse(
                "[data-testid='loginButton'], [data-testid='login'], a[href='/login'], a[href='/i/flow/login']",
            ),
        }
    }

    /// Parse one snapshot of a timeline page.
    pub fn parse(&self, html: &str) -> PageSnapshot {
        let document = Html::parse_document(html);

        // Prefer the stable testid selector; fall back to article containers if X changes markup.
        let mut containers: Vec<_> = document.select(&self.tweet).collect();
        if containers.is_empty() {
            containers = document.select(&self.article).collect();
        }

        if containers.is_empty() {
            let state = if NOT_FOUND_MARKERS.iter().any(|m| html.contains(m)) {
                PageState::AccountNotFound
            } else if document.select(&self.login).next().is_some() {
                PageState::LoginWall
            } else {
                PageState::Unrecognized
            };
            tracing::debug!(?state, "No post containers in page");
            return PageSnapshot {
                state,
                posts: Vec::new(),
                skipped: 0,
            };
        }

        let mut posts = Vec::with_capacity(containers.len());
        let mut skipped = 0;
        for container in containers {
            match self.parse_container(container) {
                Some(post) => posts.push(post),
                None => skipped += 1,
            }
        }

        tracing::debug!(parsed = posts.len(), skipped, "Parsed timeline snapshot");
        PageSnapshot {
            state: PageState::Timeline,
            posts,
            skipped,
        }
    }

    fn parse_container(&self, container: ElementRef<'_>) -> Option<ParsedPost> {
        // The permalink wraps the <time> element; other status links belong to quotes.
        let links: Vec<_> = container.select(&self.status_link).collect();
        let permalink = links
            .iter()
            .find(|a| a.select(&self.time).next().is_some())
            .or_else(|| links.first())?;

        let href = permalink.value().attr("href")?;
        let Some((author, post_id)) = parse_status_path(href) else {
            tracing::debug!(href, "Could not parse status URL");
            return None;
        };

        let Some(posted_at) = container
            .select(&self.time)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .and_then(|dt| DateTime::parse_from_rfc3339(dt).ok())
            .map(|dt| dt.with_timezone(&Utc))
        else {
            tracing::debug!(post_id, "Post has no timestamp, skipping");
            return None;
        };

        // Prefer the tweetText testid; fall back to div[lang] which often holds the rendered text.
        let text = container
            .select(&self.text)
            .next()
            .or_else(|| container.select(&self.lang_text).next())
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();

        if text.is_empty() {
            tracing::debug!(post_id, "Post has no text, skipping");
            return None;
        }

        let pinned = container
            .select(&self.social_context)
            .next()
            .is_some_and(|el| el.text().collect::<String>().contains("Pinned"));

        Some(ParsedPost {
            post_id,
            author,
            text,
            posted_at,
            pinned,
        })
    }
}

/// Parse a status path into `(author, post_id)`.
///
/// Accepts relative (`/user/status/123?s=20`) and absolute URLs.
pub fn parse_status_path(url: &str) -> Option<(String, String)> {
    let path = if url.starts_with("http") {
        url.split('/').skip(3).collect::<Vec<_>>().join("/")
    } else {
        url.trim_start_matches('/').to_string()
    };

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 3 && parts[1] == "status" {
        // Strip query parameters and fragments from the ID
        let id = parts[2]
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        if parts[0].is_empty() || id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some((parts[0].to_string(), id.to_string()))
    } else {
        None
    }
}
