//! Session acquisition for one run.

use serde::Deserialize;
use std::time::Duration;

use super::chrome::{CookieReplaySession, RemoteDebugSession};
use super::cookies::load_snapshot;
use super::BrowserSession;
use crate::config::{SessionConfig, SessionMode};
use crate::error::AuthError;

/// `/json/version` response of a Chrome debugging endpoint.
#[derive(Debug, Deserialize)]
struct DebugVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
    #[serde(rename = "Browser", default)]
    browser: Option<String>,
}

/// Establishes the browser session a run shares across accounts.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    config: SessionConfig,
    base_url: String,
}

impl SessionProvider {
    #[must_use]
    pub fn new(config: SessionConfig, base_url: impl Into<String>) -> Self {
        Self {
            config,
            base_url: base_url.into(),
        }
    }

    /// Acquire a session in the configured mode.
    ///
    /// A missing debug browser is reported as such; it never falls back to
    /// cookie replay.
    pub async fn acquire(&self) -> Result<Box<dyn BrowserSession>, AuthError> {
        tracing::info!(mode = %self.config.mode, "Acquiring browser session");
        match self.config.mode {
            SessionMode::RemoteDebug => {
                let endpoint = self.config.debug_endpoint();
                let ws_url = discover_ws_url(&endpoint).await?;
                let session = RemoteDebugSession::attach(&ws_url, &endpoint, &self.home_url()).await?;
                Ok(Box::new(session))
            }
            SessionMode::CookieReplay => {
                let cookies = load_snapshot(&self.config.cookies_path)?;
                let session =
                    CookieReplaySession::launch(&cookies, &self.base_url, self.config.headless)
                        .await?;
                Ok(Box::new(session))
            }
        }
    }

    fn home_url(&self) -> String {
        format!("{}/home", self.base_url.trim_end_matches('/'))
    }
}

/// Ask the debugging endpoint (`host:port`) for its browser websocket URL.
pub async fn discover_ws_url(endpoint: &str) -> Result<String, AuthError> {
    let no_target = |reason: String| AuthError::NoDebugTarget {
        endpoint: endpoint.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| no_target(e.to_string()))?;

    let url = format!("http://{endpoint}/json/version");
    tracing::debug!(url, "Probing remote debugging endpoint");

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| no_target(e.to_string()))?;

    if !response.status().is_success() {
        return Err(no_target(format!("HTTP {}", response.status())));
    }

    let version: DebugVersion = response
        .json()
        .await
        .map_err(|e| no_target(format!("unexpected /json/version response: {e}")))?;

    tracing::debug!(browser = ?version.browser, "Found debuggable browser");
    Ok(version.web_socket_debugger_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_discover_ws_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Browser": "Chrome/123.0.0.0",
                "Protocol-Version": "1.3",
                "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
            })))
            .mount(&server)
            .await;

        let endpoint = server.address().to_string();
        let ws = discover_ws_url(&endpoint).await.unwrap();
        assert_eq!(ws, "ws://127.0.0.1:9222/devtools/browser/abc");
    }

    #[tokio::test]
    async fn test_discover_rejects_non_debug_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json/version"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = discover_ws_url(&server.address().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoDebugTarget { .. }));
    }

    #[tokio::test]
    async fn test_nothing_listening_is_no_debug_target() {
        // Bind then drop a listener to get a port nobody is on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = discover_ws_url(&endpoint).await.unwrap_err();
        match err {
            AuthError::NoDebugTarget { endpoint: e, .. } => assert_eq!(e, endpoint),
            other => panic!("expected NoDebugTarget, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cookie_replay_with_missing_snapshot_fails_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            mode: SessionMode::CookieReplay,
            cookies_path: dir.path().join("missing.json"),
            ..SessionConfig::default()
        };

        let provider = SessionProvider::new(config, "https://x.com");
        let err = provider.acquire().await.err().unwrap();
        assert!(matches!(err, AuthError::InvalidCookies(_)));
    }
}
