//! Error types for the collection pipeline.

use thiserror::Error;

/// Failures raised by the browser layer underneath a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The CDP connection to the browser is gone.
    #[error("browser connection lost: {0}")]
    Disconnected(String),

    /// A page-level operation (navigation, script, content read) failed.
    #[error("page operation failed: {0}")]
    Page(String),
}

/// Errors that prevent a session from being established.
///
/// Always fatal to the run: no account is fetched and no digest is sent.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Nothing is listening on the remote debugging endpoint.
    #[error(
        "no browser listening for remote debugging at {endpoint} ({reason}); \
         launch Chrome with --remote-debugging-port and log in manually, then retry"
    )]
    NoDebugTarget { endpoint: String, reason: String },

    /// The attached browser is not logged in to the platform.
    #[error("browser is not logged in (landed on {url}); log in manually in the debug browser")]
    NotLoggedIn { url: String },

    /// The cookie snapshot is malformed or was rejected by the platform.
    #[error("invalid cookie snapshot: {0}")]
    InvalidCookies(String),

    /// The browser process could not be started.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Any other browser failure while setting the session up.
    #[error(transparent)]
    Browser(#[from] SessionError),
}

/// Errors reading one account's timeline.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Navigation resolved to the platform's nonexistent-account page.
    #[error("account @{0} does not exist")]
    AccountNotFound(String),

    /// Expected post structure was absent (schema drift, interstitial, login wall).
    #[error("could not extract posts for @{username}: {reason}")]
    ExtractionFailure { username: String, reason: String },

    /// The timeline page could not be loaded.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The shared browser session died mid-run.
    #[error("browser session lost while fetching @{username}: {reason}")]
    SessionLost { username: String, reason: String },
}

impl FetchError {
    /// Whether this error invalidates the shared session for every later account.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost { .. })
    }

    /// Short machine-friendly kind, used in run metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::ExtractionFailure { .. } => "extraction_failure",
            Self::Navigation { .. } => "navigation",
            Self::SessionLost { .. } => "session_lost",
        }
    }
}

/// Errors that abort a whole collection run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The session could not be acquired.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The shared session died; the remaining accounts cannot be fetched.
    #[error("run aborted: {0}")]
    SessionLost(FetchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_session_loss_is_fatal() {
        let lost = FetchError::SessionLost {
            username: "a".to_string(),
            reason: "ws closed".to_string(),
        };
        let missing = FetchError::AccountNotFound("a".to_string());
        let drift = FetchError::ExtractionFailure {
            username: "a".to_string(),
            reason: "no posts".to_string(),
        };

        assert!(lost.is_fatal());
        assert!(!missing.is_fatal());
        assert!(!drift.is_fatal());
    }

    #[test]
    fn test_no_debug_target_message_explains_recovery() {
        let err = AuthError::NoDebugTarget {
            endpoint: "127.0.0.1:9222".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:9222"));
        assert!(msg.contains("--remote-debugging-port"));
    }
}
