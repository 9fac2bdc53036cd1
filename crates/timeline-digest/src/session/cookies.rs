//! Cookie snapshot files.
//!
//! Accepts the common export formats: Selenium's `get_cookies()` dump
//! (`expiry`) and browser-extension exports such as EditThisCookie
//! (`expirationDate`, extra bookkeeping fields ignored).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AuthError;

/// Name of the long-lived auth cookie.
pub const AUTH_COOKIE: &str = "auth_token";

/// One exported cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry as seconds since the epoch; `None` for session cookies.
    #[serde(default, alias = "expirationDate", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// Expiry as a timestamp, if the cookie is persistent.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
    }
}

/// Read and validate a snapshot file.
pub fn load_snapshot(path: &Path) -> Result<Vec<CookieRecord>, AuthError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        AuthError::InvalidCookies(format!("cannot read {}: {e}", path.display()))
    })?;
    let cookies: Vec<CookieRecord> = serde_json::from_str(&content).map_err(|e| {
        AuthError::InvalidCookies(format!("malformed snapshot {}: {e}", path.display()))
    })?;
    validate_snapshot(&cookies, Utc::now())?;
    tracing::debug!(path = %path.display(), count = cookies.len(), "Loaded cookie snapshot");
    Ok(cookies)
}

/// Check that a snapshot can possibly authenticate.
pub fn validate_snapshot(cookies: &[CookieRecord], now: DateTime<Utc>) -> Result<(), AuthError> {
    if cookies.is_empty() {
        return Err(AuthError::InvalidCookies("snapshot is empty".to_string()));
    }

    let auth = cookies
        .iter()
        .find(|c| c.name == AUTH_COOKIE)
        .ok_or_else(|| AuthError::InvalidCookies(format!("snapshot has no {AUTH_COOKIE} cookie")))?;

    if auth.value.trim().is_empty() {
        return Err(AuthError::InvalidCookies(format!("{AUTH_COOKIE} is empty")));
    }
    if let Some(expires) = auth.expires_at() {
        if expires <= now {
            return Err(AuthError::InvalidCookies(format!(
                "{AUTH_COOKIE} expired at {expires}"
            )));
        }
    }
    Ok(())
}

/// Write a snapshot file, creating parent directories.
pub fn save_snapshot(cookies: &[CookieRecord], path: &Path) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(cookies)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn auth(expiry: Option<f64>) -> CookieRecord {
        CookieRecord {
            name: AUTH_COOKIE.to_string(),
            value: "secret".to_string(),
            domain: Some(".x.com".to_string()),
            path: "/".to_string(),
            expiry,
            secure: true,
            http_only: true,
            same_site: None,
        }
    }

    #[test]
    fn test_parse_selenium_export() {
        let json = r#"[
            {"name": "auth_token", "value": "abc", "domain": ".x.com", "path": "/",
             "expiry": 1900000000, "secure": true, "httpOnly": true, "sameSite": "None"},
            {"name": "ct0", "value": "def", "domain": ".x.com"}
        ]"#;
        let cookies: Vec<CookieRecord> = serde_json::from_str(json).unwrap();

        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].expiry, Some(1_900_000_000.0));
        assert!(cookies[0].http_only);
        assert_eq!(cookies[0].same_site.as_deref(), Some("None"));
        assert_eq!(cookies[1].path, "/");
        assert!(!cookies[1].secure);
    }

    #[test]
    fn test_parse_extension_export() {
        let json = r#"[{"domain": ".x.com", "expirationDate": 1900000000.5, "hostOnly": false,
            "httpOnly": true, "name": "auth_token", "path": "/", "sameSite": "no_restriction",
            "secure": true, "session": false, "storeId": "0", "value": "abc", "id": 1}]"#;
        let cookies: Vec<CookieRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(cookies[0].expiry, Some(1_900_000_000.5));
        assert!(validate_snapshot(&cookies, Utc::now()).is_ok());
    }

    #[test]
    fn test_empty_snapshot_rejected() {
        let err = validate_snapshot(&[], Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCookies(_)));
    }

    #[test]
    fn test_missing_auth_cookie_rejected() {
        let mut cookie = auth(None);
        cookie.name = "ct0".to_string();
        let err = validate_snapshot(&[cookie], Utc::now()).unwrap_err();
        assert!(err.to_string().contains(AUTH_COOKIE));
    }

    #[test]
    fn test_expired_auth_cookie_rejected() {
        let now = Utc::now();
        let past = (now - Duration::days(1)).timestamp() as f64;
        let future = (now + Duration::days(30)).timestamp() as f64;

        assert!(validate_snapshot(&[auth(Some(past))], now).is_err());
        assert!(validate_snapshot(&[auth(Some(future))], now).is_ok());
        // Session cookies carry no expiry.
        assert!(validate_snapshot(&[auth(None)], now).is_ok());
        assert!(validate_snapshot(&[auth(Some(-1.0))], now).is_ok());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_snapshot(&path).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCookies(_)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cookies.json");

        save_snapshot(&[auth(None)], &path).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, vec![auth(None)]);
    }
}
