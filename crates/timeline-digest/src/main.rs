//! Timeline digest CLI - collect keyword-matching posts from X accounts and email them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use timeline_digest::config::AppConfig;
use timeline_digest::digest::{
    DigestRenderer, DigestSink, EmailSink, RunOutcome, SentHistory, StdoutSink,
};
use timeline_digest::pipeline::run_collection;
use timeline_digest::schedule::{parse_send_time, run_daily};
use timeline_digest::session::{export_cookies, SessionProvider};
use timeline_digest::SessionMode;

/// Timeline digest CLI - daily keyword digests of X account timelines.
#[derive(Parser)]
#[command(name = "timeline-digest")]
#[command(about = "Collect recent keyword-matching posts from X accounts and email a digest")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file
    #[arg(
        short,
        long,
        global = true,
        env = "TIMELINE_DIGEST_CONFIG",
        default_value = "config/config.yaml"
    )]
    config: PathBuf,

    /// Accounts file (defaults to the inline `accounts:` list in the config)
    #[arg(long, global = true, env = "TIMELINE_DIGEST_ACCOUNTS")]
    accounts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one collection and deliver the digest
    Run {
        /// Print the digest instead of emailing it
        #[arg(long)]
        dry_run: bool,

        /// Print the digest payload as JSON (implies --dry-run)
        #[arg(long)]
        json: bool,

        /// Override the configured session mode
        #[arg(long, value_enum)]
        session_mode: Option<ModeArg>,
    },

    /// Run every day at email.send_time (local time)
    Schedule {
        /// Print digests instead of emailing them
        #[arg(long)]
        dry_run: bool,

        /// Override the configured session mode
        #[arg(long, value_enum)]
        session_mode: Option<ModeArg>,
    },

    /// Save cookies from the logged-in debug browser for cookie-replay runs
    ExportCookies {
        /// Output file (defaults to session.cookies_path)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Load and validate configuration, then print a summary
    CheckConfig,

    /// Send a test email using the email settings
    SendTest,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    RemoteDebug,
    CookieReplay,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::RemoteDebug => Self::RemoteDebug,
            ModeArg::CookieReplay => Self::CookieReplay,
        }
    }
}

/// Options shared by `run` and `schedule`.
#[derive(Clone)]
struct RunOptions {
    config: PathBuf,
    accounts: Option<PathBuf>,
    dry_run: bool,
    json: bool,
    session_mode: Option<SessionMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let debug = cli.verbose || config_requests_debug(&cli.config);
    let default_filter = if debug {
        "timeline_digest=debug,info"
    } else {
        "timeline_digest=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            dry_run,
            json,
            session_mode,
        } => {
            let options = RunOptions {
                config: cli.config,
                accounts: cli.accounts,
                dry_run: dry_run || json,
                json,
                session_mode: session_mode.map(Into::into),
            };
            let outcome = run_once(&options).await?;
            if outcome == RunOutcome::AllFailed {
                bail!("Every account failed; see the digest for reasons");
            }
            Ok(())
        }
        Commands::Schedule {
            dry_run,
            session_mode,
        } => {
            let options = RunOptions {
                config: cli.config,
                accounts: cli.accounts,
                dry_run,
                json: false,
                session_mode: session_mode.map(Into::into),
            };
            run_schedule(options).await
        }
        Commands::ExportCookies { output } => run_export_cookies(&cli.config, output).await,
        Commands::CheckConfig => run_check_config(&cli.config, cli.accounts.as_deref()),
        Commands::SendTest => run_send_test(&cli.config).await,
    }
}

/// Whether `collection.debug` is set, read before logging is up. Errors are
/// left for the real load to report.
fn config_requests_debug(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_yaml::from_str::<serde_yaml::Value>(&s).ok())
        .and_then(|v| v.get("collection")?.get("debug")?.as_bool())
        .unwrap_or(false)
}

async fn run_once(options: &RunOptions) -> Result<RunOutcome> {
    let mut config = AppConfig::load(&options.config)?;
    if let Some(mode) = options.session_mode {
        config.session.mode = mode;
    }
    let accounts = config.resolve_accounts(options.accounts.as_deref())?;
    let history_path = config.collection.history_path.clone();
    let mut history = SentHistory::load(&history_path)?;

    tracing::info!(
        accounts = accounts.len(),
        mode = %config.session.mode,
        dry_run = options.dry_run,
        already_sent = history.count(),
        "Starting collection"
    );

    let mut payload = run_collection(&config, &accounts).await?;
    let dropped = history.remove_sent(&mut payload);
    if dropped > 0 {
        tracing::info!(dropped, "Skipped posts delivered by earlier runs");
    }

    let sink: Box<dyn DigestSink> = match (&config.email, options.dry_run) {
        (Some(email), false) => Box::new(EmailSink::from_env(email.clone())?),
        (email, dry_run) => {
            if !dry_run {
                tracing::warn!("No email section configured, printing digest instead");
            }
            let template = email
                .as_ref()
                .map_or_else(|| "Timeline Digest - {date}".to_string(), |e| e.subject_template.clone());
            Box::new(StdoutSink::new(DigestRenderer::new(template)).json(options.json))
        }
    };

    sink.deliver(&payload)
        .await
        .with_context(|| format!("Failed to deliver digest via {}", sink.name()))?;

    // Dry runs do not touch the history.
    if !options.dry_run {
        history.record(&payload);
        history.save(&history_path)?;
        tracing::debug!(path = %history_path.display(), sent = history.count(), "Saved sent history");
    }

    let outcome = payload.outcome();
    tracing::info!(
        sink = sink.name(),
        posts = payload.total_posts(),
        failed = payload.accounts_failed,
        %outcome,
        "Digest delivered"
    );
    Ok(outcome)
}

async fn run_schedule(options: RunOptions) -> Result<()> {
    let config = AppConfig::load(&options.config)?;
    let send_time = config
        .email
        .as_ref()
        .map_or("08:00", |e| e.send_time.as_str());
    let send_time = parse_send_time(send_time)?;

    tracing::info!(send_time = %send_time.format("%H:%M"), "Starting daily schedule");

    run_daily(send_time, || {
        let options = options.clone();
        async move {
            match run_once(&options).await? {
                RunOutcome::AllFailed => bail!("Every account failed"),
                _ => Ok(()),
            }
        }
    })
    .await
}

async fn run_export_cookies(config_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let mut session_config = config.session.clone();
    session_config.mode = SessionMode::RemoteDebug;
    let output = output.unwrap_or_else(|| config.session.cookies_path.clone());

    let domain = url::Url::parse(&config.collection.base_url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .with_context(|| format!("Invalid base_url: {}", config.collection.base_url))?;

    println!("🔐 Exporting cookies from the debug browser at {}", session_config.debug_endpoint());

    let provider = SessionProvider::new(session_config, config.collection.base_url.clone());
    let session = provider.acquire().await?;
    let result = export_cookies(session.as_ref(), &domain, &output).await;
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Failed to close browser session");
    }

    let count = result?;
    println!("✅ Saved {count} cookies to: {}", output.display());
    Ok(())
}

fn run_check_config(config_path: &Path, accounts_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let accounts = config.resolve_accounts(accounts_path)?;
    let c = &config.collection;

    println!("📋 Configuration OK: {}\n", config_path.display());
    println!("   Session mode: {}", config.session.mode);
    println!("   Max items per account: {}", c.max_items);
    println!("   Window: {} day(s)", c.start_days);
    println!("   Sent history: {}", c.history_path.display());
    println!("   Global keywords: {}", c.keywords.join(", "));
    match &config.email {
        Some(email) => println!(
            "   Email: {} recipient(s) via {}:{}, daily at {}",
            email.recipients.len(),
            email.smtp_host,
            email.smtp_port,
            email.send_time
        ),
        None => println!("   Email: not configured (digests print to stdout)"),
    }

    println!("\n   Accounts ({}):", accounts.len());
    for account in &accounts {
        let keywords: Vec<&str> = account.keywords.iter().map(String::as_str).collect();
        println!(
            "     - {} ({}) {}",
            account.at_handle(),
            account.display_name,
            if keywords.is_empty() {
                String::new()
            } else {
                format!("[{}]", keywords.join(", "))
            }
        );
    }
    Ok(())
}

async fn run_send_test(config_path: &Path) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let email = config
        .email
        .context("No email section in config; nothing to test")?;

    println!("📧 Sending test email to {}", email.recipients.join(", "));
    EmailSink::from_env(email)?.send_test().await?;
    println!("✅ Test email sent");
    Ok(())
}
