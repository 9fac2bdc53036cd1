//! Chromium-backed sessions using chromiumoxide.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Cookie, CookieParam, CookieSameSite, TimeSinceEpoch,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::Handler;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::cookies::CookieRecord;
use super::{is_login_url, BrowserSession};
use crate::config::SessionMode;
use crate::error::{AuthError, SessionError};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// One CDP-controlled tab plus the task pumping browser events.
struct ChromeTab {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    valid: bool,
}

impl ChromeTab {
    fn new(browser: Browser, page: Page, handler: JoinHandle<()>) -> Self {
        Self {
            browser,
            page,
            handler,
            valid: true,
        }
    }

    /// The event loop stops on the first handler error, which means the socket is gone.
    fn classify(&self, err: &CdpError) -> SessionError {
        if self.handler.is_finished() {
            SessionError::Disconnected(err.to_string())
        } else {
            SessionError::Page(err.to_string())
        }
    }

    fn track<T>(&mut self, res: Result<T, CdpError>) -> Result<T, SessionError> {
        res.map_err(|e| {
            let err = self.classify(&e);
            if matches!(err, SessionError::Disconnected(_)) {
                self.valid = false;
            }
            err
        })
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        tracing::debug!(url, "Navigating");
        let res = self.page.goto(url).await.map(|_| ());
        self.track(res)
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| self.classify(&e))
    }

    async fn content(&self) -> Result<String, SessionError> {
        self.page.content().await.map_err(|e| self.classify(&e))
    }

    async fn load_more(&mut self) -> Result<(), SessionError> {
        let res = self.page.evaluate(SCROLL_SCRIPT).await.map(|_| ());
        self.track(res)
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, SessionError> {
        // Via CDP: document.cookie can't see HttpOnly cookies like auth_token.
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| self.classify(&e))?;
        Ok(cookies.into_iter().map(record_from_cookie).collect())
    }

    async fn is_authenticated(&self) -> Result<bool, SessionError> {
        let url = self.current_url().await?;
        if is_login_url(&url) {
            return Ok(false);
        }
        let cookies = self.cookies().await?;
        Ok(cookies.iter().any(|c| c.name == super::cookies::AUTH_COOKIE))
    }
}

fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

/// Session attached to an operator-launched browser over the debugging port.
///
/// Opens its own tab and closes only that tab on teardown; the browser
/// process belongs to the operator.
pub struct RemoteDebugSession {
    tab: ChromeTab,
}

impl RemoteDebugSession {
    /// Connect to the browser behind `ws_url` and open a tab on `home_url`.
    pub async fn attach(ws_url: &str, endpoint: &str, home_url: &str) -> Result<Self, AuthError> {
        let (browser, handler) =
            Browser::connect(ws_url)
                .await
                .map_err(|e| AuthError::NoDebugTarget {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        let handler = spawn_handler(handler);

        let page = browser
            .new_page(home_url)
            .await
            .map_err(|e| SessionError::Page(e.to_string()))?;

        let session = Self {
            tab: ChromeTab::new(browser, page, handler),
        };

        if !session.tab.is_authenticated().await? {
            let url = session.tab.current_url().await.unwrap_or_default();
            tracing::error!(url, "Debug browser is not logged in");
            // Leave the operator's browser untouched, only drop our tab.
            let _ = Box::new(session).close().await;
            return Err(AuthError::NotLoggedIn { url });
        }

        tracing::info!(endpoint, "Attached to remote debugging browser");
        Ok(session)
    }
}

#[async_trait]
impl BrowserSession for RemoteDebugSession {
    fn origin(&self) -> SessionMode {
        SessionMode::RemoteDebug
    }

    fn is_valid(&self) -> bool {
        self.tab.valid
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.tab.navigate(url).await
    }

    async fn is_authenticated(&self) -> Result<bool, SessionError> {
        self.tab.is_authenticated().await
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.tab.current_url().await
    }

    async fn content(&self) -> Result<String, SessionError> {
        self.tab.content().await
    }

    async fn load_more(&mut self) -> Result<(), SessionError> {
        self.tab.load_more().await
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, SessionError> {
        self.tab.cookies().await
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let ChromeTab {
            browser,
            page,
            handler,
            ..
        } = self.tab;
        let res = page
            .close()
            .await
            .map_err(|e| SessionError::Page(e.to_string()));
        handler.abort();
        drop(browser);
        tracing::debug!("Closed remote debugging tab; browser left running");
        res
    }
}

/// Session in a freshly launched browser, authenticated by cookie replay.
///
/// Owns the browser process and shuts it down on teardown.
pub struct CookieReplaySession {
    tab: ChromeTab,
}

impl CookieReplaySession {
    /// Launch a browser, inject `cookies` for `base_url`, and confirm the login took.
    pub async fn launch(
        cookies: &[CookieRecord],
        base_url: &str,
        headless: bool,
    ) -> Result<Self, AuthError> {
        tracing::info!(headless, count = cookies.len(), "Launching browser for cookie replay");

        let builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-dev-shm-usage") // Avoid /dev/shm size issues in containers
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={USER_AGENT}"));
        let builder = if headless { builder } else { builder.with_head() };
        let config = builder
            .build()
            .map_err(|e| AuthError::Launch(format!("invalid browser config: {e}")))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| AuthError::Launch(e.to_string()))?;
        let handler = spawn_handler(handler);

        // Cookies can only be set once the page is on the platform's domain.
        let page = browser
            .new_page(base_url)
            .await
            .map_err(|e| SessionError::Page(e.to_string()))?;

        let default_domain = cookie_domain(base_url);
        let params = cookies
            .iter()
            .map(|c| cookie_param(c, &default_domain))
            .collect::<Result<Vec<_>, _>>()?;
        page.set_cookies(params)
            .await
            .map_err(|e| AuthError::InvalidCookies(format!("browser rejected cookies: {e}")))?;

        let mut session = Self {
            tab: ChromeTab::new(browser, page, handler),
        };
        session
            .tab
            .navigate(&format!("{}/home", base_url.trim_end_matches('/')))
            .await?;

        if !session.tab.is_authenticated().await? {
            let url = session.tab.current_url().await.unwrap_or_default();
            tracing::error!(url, "Redirected to login - cookie snapshot is invalid or expired");
            let _ = Box::new(session).close().await;
            return Err(AuthError::InvalidCookies(format!(
                "rejected by the platform (landed on {url})"
            )));
        }

        tracing::info!("Cookie replay session established");
        Ok(session)
    }
}

#[async_trait]
impl BrowserSession for CookieReplaySession {
    fn origin(&self) -> SessionMode {
        SessionMode::CookieReplay
    }

    fn is_valid(&self) -> bool {
        self.tab.valid
    }

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.tab.navigate(url).await
    }

    async fn is_authenticated(&self) -> Result<bool, SessionError> {
        self.tab.is_authenticated().await
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        self.tab.current_url().await
    }

    async fn content(&self) -> Result<String, SessionError> {
        self.tab.content().await
    }

    async fn load_more(&mut self) -> Result<(), SessionError> {
        self.tab.load_more().await
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>, SessionError> {
        self.tab.cookies().await
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        let ChromeTab {
            mut browser,
            handler,
            ..
        } = self.tab;
        let res = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| SessionError::Page(e.to_string()));
        let _ = handler.await;
        tracing::debug!("Browser closed");
        res
    }
}

/// Cookie domain for a platform origin: `https://x.com` -> `.x.com`.
fn cookie_domain(base_url: &str) -> String {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| format!(".{h}")))
        .unwrap_or_else(|| ".x.com".to_string())
}

fn cookie_param(record: &CookieRecord, default_domain: &str) -> Result<CookieParam, AuthError> {
    let mut builder = CookieParam::builder()
        .name(record.name.clone())
        .value(record.value.clone())
        .domain(record.domain.clone().unwrap_or_else(|| default_domain.to_string()))
        .path(record.path.clone())
        .secure(record.secure)
        .http_only(record.http_only);

    if let Some(expiry) = record.expiry.filter(|e| *e > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expiry));
    }
    if let Some(same_site) = record.same_site.as_deref().and_then(parse_same_site) {
        builder = builder.same_site(same_site);
    }

    builder
        .build()
        .map_err(|e| AuthError::InvalidCookies(format!("cookie {}: {e}", record.name)))
}

/// Map export spellings onto CDP's enum. Unknown values leave the browser default.
fn parse_same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" | "no_restriction" => Some(CookieSameSite::None),
        _ => None,
    }
}

fn record_from_cookie(cookie: Cookie) -> CookieRecord {
    let same_site = cookie.same_site.map(|s| {
        match s {
            CookieSameSite::Strict => "Strict",
            CookieSameSite::Lax => "Lax",
            CookieSameSite::None => "None",
        }
        .to_string()
    });
    CookieRecord {
        name: cookie.name,
        value: cookie.value,
        domain: Some(cookie.domain),
        path: cookie.path,
        expiry: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
        secure: cookie.secure,
        http_only: cookie.http_only,
        same_site,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("https://x.com"), ".x.com");
        assert_eq!(cookie_domain("http://127.0.0.1:8080"), ".127.0.0.1");
        assert_eq!(cookie_domain("not a url"), ".x.com");
    }

    #[test]
    fn test_parse_same_site() {
        assert_eq!(parse_same_site("no_restriction"), Some(CookieSameSite::None));
        assert_eq!(parse_same_site("Lax"), Some(CookieSameSite::Lax));
        assert_eq!(parse_same_site("unspecified"), None);
    }
}
