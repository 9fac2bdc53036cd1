//! Configuration loading for collection runs.
//!
//! Two YAML documents drive a run: `config.yaml` (collector, session and email
//! settings) and `accounts.yaml` (the monitored accounts, in processing order).
//! Accounts may also be listed inline under `accounts:` in `config.yaml`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::timeline::Account;

/// Default remote debugging host.
pub const DEFAULT_DEBUG_HOST: &str = "127.0.0.1";

/// Default remote debugging port.
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Default platform origin.
pub const DEFAULT_BASE_URL: &str = "https://x.com";

/// Environment variable holding the SMTP password.
pub const ENV_SMTP_PASSWORD: &str = "SMTP_PASSWORD";

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// X (formerly Twitter).
    #[serde(alias = "twitter")]
    X,
}

/// Collector settings (`collection:` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Platforms to collect from. Only `x` is supported.
    #[serde(default = "default_platforms")]
    pub platforms: Vec<Platform>,
    /// Max posts collected per account.
    pub max_items: usize,
    /// Size of the recency window in days.
    pub start_days: u32,
    /// Global keywords applied to every account.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Debug-level logging for this crate.
    #[serde(default)]
    pub debug: bool,
    /// Consecutive empty loads before the scroll loop gives up.
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,
    /// Attempts to find the post structure before failing the account.
    #[serde(default = "default_extraction_retries")]
    pub extraction_retries: u32,
    /// Wait after each scroll for new posts to render.
    #[serde(default = "default_scroll_wait_secs")]
    pub scroll_wait_secs: u64,
    /// Wait after navigating to a timeline.
    #[serde(default = "default_page_load_wait_secs")]
    pub page_load_wait_secs: u64,
    /// Hard wall-clock limit per account.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between accounts, to stay under platform rate limits.
    #[serde(default = "default_account_delay_secs")]
    pub account_delay_secs: u64,
    /// Platform origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// IDs of posts already delivered, so later runs do not send them again.
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

/// How the browser session is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Attach to a logged-in browser on the debugging port.
    RemoteDebug,
    /// Launch a browser and inject a saved cookie snapshot.
    CookieReplay,
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteDebug => write!(f, "remote-debug"),
            Self::CookieReplay => write!(f, "cookie-replay"),
        }
    }
}

/// Browser session settings (`session:` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_mode")]
    pub mode: SessionMode,
    #[serde(default = "default_debug_host")]
    pub debug_host: String,
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    /// Cookie snapshot used in `cookie-replay` mode.
    #[serde(default = "default_cookies_path")]
    pub cookies_path: PathBuf,
    /// Run the launched browser without a window (`cookie-replay` only).
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: default_session_mode(),
            debug_host: default_debug_host(),
            debug_port: default_debug_port(),
            cookies_path: default_cookies_path(),
            headless: true,
        }
    }
}

impl SessionConfig {
    /// `host:port` of the remote debugging endpoint.
    #[must_use]
    pub fn debug_endpoint(&self) -> String {
        format!("{}:{}", self.debug_host, self.debug_port)
    }
}

/// Digest email settings (`email:` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Subject line; `{date}` is replaced with the local date.
    #[serde(default = "default_subject_template")]
    pub subject_template: String,
    pub recipients: Vec<String>,
    pub sender: String,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP login; defaults to the sender address.
    #[serde(default)]
    pub smtp_username: Option<String>,
    /// Use STARTTLS.
    #[serde(default = "default_true")]
    pub use_tls: bool,
    /// Daily send time (`HH:MM`, local) for `schedule`.
    #[serde(default = "default_send_time")]
    pub send_time: String,
}

/// One entry of the accounts file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AccountEntry {
    /// Convert to the immutable runtime account.
    #[must_use]
    pub fn into_account(self) -> Account {
        let username = self.username.trim().trim_start_matches('@').to_string();
        let display_name = self.full_name.unwrap_or_else(|| username.clone());
        Account::new(username, display_name, self.keywords)
    }
}

/// Top-level `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub collection: CollectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    /// Inline account list, used when no accounts file is given.
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,
}

impl AppConfig {
    /// Load and validate `config.yaml`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the collector constraints.
    pub fn validate(&self) -> Result<()> {
        let c = &self.collection;
        if c.platforms.is_empty() {
            bail!("collection.platforms must list at least one platform");
        }
        if c.max_items == 0 {
            bail!("collection.max_items must be greater than 0");
        }
        if c.start_days == 0 {
            bail!("collection.start_days must be greater than 0");
        }
        if c.stall_limit == 0 {
            bail!("collection.stall_limit must be greater than 0");
        }
        if c.extraction_retries == 0 {
            bail!("collection.extraction_retries must be greater than 0");
        }
        if let Some(email) = &self.email {
            if email.recipients.is_empty() {
                tracing::warn!("email.recipients is empty; digests will not be delivered");
            }
        }
        Ok(())
    }

    /// Resolve the account list: the accounts file if given, else the inline list.
    pub fn resolve_accounts(&self, accounts_path: Option<&Path>) -> Result<Vec<Account>> {
        let entries = match accounts_path {
            Some(path) => load_account_entries(path)?,
            None => self.accounts.clone(),
        };
        validate_accounts(&entries, &self.collection.keywords)?;
        Ok(entries.into_iter().map(AccountEntry::into_account).collect())
    }
}

/// Accounts file: either a bare list or `{accounts: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AccountsFile {
    List(Vec<AccountEntry>),
    Wrapped { accounts: Vec<AccountEntry> },
}

/// Load the accounts file.
pub fn load_account_entries(path: &Path) -> Result<Vec<AccountEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
    let file: AccountsFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse accounts file {}", path.display()))?;
    Ok(match file {
        AccountsFile::List(list) | AccountsFile::Wrapped { accounts: list } => list,
    })
}

fn validate_accounts(entries: &[AccountEntry], global_keywords: &[String]) -> Result<()> {
    if entries.is_empty() {
        bail!("no accounts configured");
    }

    let mut seen = HashSet::new();
    for entry in entries {
        let handle = entry.username.trim().trim_start_matches('@').to_lowercase();
        if handle.is_empty() {
            bail!("account with empty username");
        }
        if !seen.insert(handle.clone()) {
            bail!("duplicate account username: {handle}");
        }
        if entry.keywords.is_empty() && global_keywords.is_empty() {
            tracing::warn!(
                username = %handle,
                "Account has no keywords and no global keywords are set; nothing can match"
            );
        }
    }
    Ok(())
}

fn default_platforms() -> Vec<Platform> {
    vec![Platform::X]
}
fn default_stall_limit() -> u32 {
    2
}
fn default_extraction_retries() -> u32 {
    3
}
fn default_scroll_wait_secs() -> u64 {
    3
}
fn default_page_load_wait_secs() -> u64 {
    5
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_account_delay_secs() -> u64 {
    4
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_history_path() -> PathBuf {
    PathBuf::from("data/sent_posts.json")
}
fn default_session_mode() -> SessionMode {
    SessionMode::RemoteDebug
}
fn default_debug_host() -> String {
    DEFAULT_DEBUG_HOST.to_string()
}
fn default_debug_port() -> u16 {
    DEFAULT_DEBUG_PORT
}
fn default_cookies_path() -> PathBuf {
    PathBuf::from("data/x_cookies.json")
}
fn default_true() -> bool {
    true
}
fn default_subject_template() -> String {
    "AI Daily - {date}".to_string()
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_send_time() -> String {
    "08:00".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
collection:
  platforms: [x]
  max_items: 50
  start_days: 1
  keywords: [AI, LLM]
session:
  mode: cookie-replay
  cookies_path: /tmp/cookies.json
email:
  recipients: [team@example.com]
  sender: digest@example.com
accounts:
  - username: "@karpathy"
    full_name: Andrej Karpathy
    keywords: [GPT]
"#;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_with_defaults() {
        let file = write_temp(CONFIG);
        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.collection.max_items, 50);
        assert_eq!(config.collection.stall_limit, 2);
        assert_eq!(config.collection.base_url, "https://x.com");
        assert_eq!(config.collection.history_path, PathBuf::from("data/sent_posts.json"));
        assert_eq!(config.session.mode, SessionMode::CookieReplay);
        assert_eq!(config.session.debug_endpoint(), "127.0.0.1:9222");

        let email = config.email.unwrap();
        assert_eq!(email.subject_template, "AI Daily - {date}");
        assert_eq!(email.smtp_port, 587);
    }

    #[test]
    fn test_zero_max_items_rejected() {
        let file = write_temp("collection:\n  max_items: 0\n  start_days: 1\n");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_items"));
    }

    #[test]
    fn test_zero_start_days_rejected() {
        let file = write_temp("collection:\n  max_items: 10\n  start_days: 0\n");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("start_days"));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let file = write_temp("collection:\n  platforms: [mastodon]\n  max_items: 10\n  start_days: 1\n");
        assert!(AppConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_inline_accounts_normalized() {
        let file = write_temp(CONFIG);
        let config = AppConfig::load(file.path()).unwrap();
        let accounts = config.resolve_accounts(None).unwrap();

        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].username, "karpathy");
        assert_eq!(accounts[0].display_name, "Andrej Karpathy");
        assert!(accounts[0].keywords.contains("GPT"));
    }

    #[test]
    fn test_accounts_file_list_and_wrapped() {
        let list = write_temp("- username: a\n- username: b\n  full_name: Bee\n");
        let wrapped = write_temp("accounts:\n  - username: a\n");

        let entries = load_account_entries(list.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].full_name.as_deref(), Some("Bee"));
        assert_eq!(load_account_entries(wrapped.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_accounts_rejected() {
        let file = write_temp(CONFIG);
        let config = AppConfig::load(file.path()).unwrap();
        let accounts = write_temp("- username: same\n- username: \"@Same\"\n");

        let err = config.resolve_accounts(Some(accounts.path())).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_missing_full_name_defaults_to_username() {
        let entry = AccountEntry {
            username: "sama".to_string(),
            full_name: None,
            keywords: vec![],
        };
        let account = entry.into_account();
        assert_eq!(account.display_name, "sama");
        assert!(account.keywords.is_empty());
    }
}
