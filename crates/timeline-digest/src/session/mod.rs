//! Browser session acquisition.
//!
//! A session is either attached to a browser the operator already logged in
//! with (remote debugging), or launched fresh with a replayed cookie snapshot.
//! Both variants sit behind [`BrowserSession`]; nothing downstream branches on
//! which one it holds.

mod chrome;
mod cookies;
mod provider;

pub use chrome::{CookieReplaySession, RemoteDebugSession};
pub use cookies::{load_snapshot, save_snapshot, validate_snapshot, CookieRecord};
pub use provider::{discover_ws_url, SessionProvider};

use async_trait::async_trait;
use std::path::Path;

use crate::config::SessionMode;
use crate::error::SessionError;

/// An authenticated browser tab shared by one run.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// How this session was established.
    fn origin(&self) -> SessionMode;

    /// False once the browser connection has been observed to drop.
    fn is_valid(&self) -> bool;

    /// Navigate the tab and wait for the load to settle.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Whether the tab is logged in (not on a login flow, auth cookie present).
    async fn is_authenticated(&self) -> Result<bool, SessionError>;

    /// URL the tab currently shows.
    async fn current_url(&self) -> Result<String, SessionError>;

    /// Rendered HTML of the current page.
    async fn content(&self) -> Result<String, SessionError>;

    /// Trigger the page to load more content (scroll to the bottom).
    async fn load_more(&mut self) -> Result<(), SessionError>;

    /// Cookies visible to the current page.
    async fn cookies(&self) -> Result<Vec<CookieRecord>, SessionError>;

    /// Tear the session down. Remote-debug sessions leave the browser running.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Whether a URL belongs to the platform's login flow: `/login`, `/logout`
/// or anything under `/i/flow/`. Path segments are compared whole, so a
/// profile such as `/loginradius` is not a login page.
#[must_use]
pub fn is_login_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let mut segments = parsed
        .path_segments()
        .into_iter()
        .flatten()
        .map(str::to_ascii_lowercase);
    match segments.next().as_deref() {
        Some("login" | "logout") => true,
        Some("i") => segments.next().as_deref() == Some("flow"),
        _ => false,
    }
}

/// Write the session's cookies for `domain` to a snapshot file, so a
/// remote-debug login can seed later cookie-replay runs. Returns how many were written.
pub async fn export_cookies(
    session: &dyn BrowserSession,
    domain: &str,
    path: &Path,
) -> anyhow::Result<usize> {
    let cookies: Vec<CookieRecord> = session
        .cookies()
        .await?
        .into_iter()
        .filter(|c| cookie_matches_domain(c, domain))
        .collect();

    validate_snapshot(&cookies, chrono::Utc::now())?;
    save_snapshot(&cookies, path)?;
    tracing::info!(path = %path.display(), count = cookies.len(), "Exported cookie snapshot");
    Ok(cookies.len())
}

fn cookie_matches_domain(cookie: &CookieRecord, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    cookie.domain.as_deref().map_or(true, |d| {
        let d = d.trim_start_matches('.');
        d == domain || d.ends_with(&format!(".{domain}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, domain: Option<&str>) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            value: "v".to_string(),
            domain: domain.map(ToString::to_string),
            path: "/".to_string(),
            expiry: None,
            secure: true,
            http_only: false,
            same_site: None,
        }
    }

    #[test]
    fn test_cookie_domain_matching() {
        assert!(cookie_matches_domain(&cookie("a", Some(".x.com")), "x.com"));
        assert!(cookie_matches_domain(&cookie("a", Some("api.x.com")), ".x.com"));
        assert!(cookie_matches_domain(&cookie("a", None), "x.com"));
        assert!(!cookie_matches_domain(&cookie("a", Some("notx.com")), "x.com"));
        assert!(!cookie_matches_domain(&cookie("a", Some(".google.com")), "x.com"));
    }

    #[test]
    fn test_is_login_url() {
        assert!(is_login_url("https://x.com/i/flow/login"));
        assert!(is_login_url("https://x.com/login?redirect_after_login=%2Fhome"));
        assert!(is_login_url("https://x.com/logout"));
        assert!(!is_login_url("https://x.com/home"));
        assert!(!is_login_url("https://x.com/openai"));
    }

    #[test]
    fn test_handles_that_start_like_login_paths() {
        assert!(!is_login_url("https://x.com/loginradius"));
        assert!(!is_login_url("https://x.com/logoutlabs"));
        assert!(!is_login_url("https://x.com/iflow"));
        assert!(!is_login_url("https://x.com/openai/status/1/login"));
        assert!(is_login_url("https://x.com/LOGIN"));
        assert!(is_login_url("https://x.com/i/flow/single_sign_on"));
        assert!(!is_login_url("not a url"));
    }
}
