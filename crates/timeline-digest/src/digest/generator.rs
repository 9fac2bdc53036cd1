//! Digest content generator.
//!
//! Renders a [`DigestPayload`] as an email subject plus HTML and plain-text bodies.

use chrono::NaiveDate;
use std::fmt::Write;

use super::payload::DigestPayload;
use crate::timeline::AcceptedPost;

/// Keywords listed in the summary line.
const TOP_KEYWORDS: usize = 5;

/// A rendered digest, ready for a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Turns payloads into email content.
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    subject_template: String,
}

impl DigestRenderer {
    #[must_use]
    pub fn new(subject_template: impl Into<String>) -> Self {
        Self {
            subject_template: subject_template.into(),
        }
    }

    /// Render everything for the digest dated `date` (local calendar date).
    #[must_use]
    pub fn render(&self, payload: &DigestPayload, date: NaiveDate) -> RenderedDigest {
        RenderedDigest {
            subject: self.subject(date),
            html: Self::generate_html(payload, date),
            text: Self::generate_text(payload, date),
        }
    }

    /// Subject with `{date}` replaced by `YYYY-MM-DD`.
    #[must_use]
    pub fn subject(&self, date: NaiveDate) -> String {
        self.subject_template
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }

    /// One-line summary: post and account counts plus the top keywords.
    #[must_use]
    pub fn summary_line(payload: &DigestPayload) -> String {
        let posts = payload.total_posts();
        if posts == 0 {
            return format!(
                "No matching posts from {} monitored account(s).",
                payload.accounts_attempted
            );
        }

        let mut line = format!(
            "{posts} post(s) from {} of {} account(s).",
            payload.groups.len(),
            payload.accounts_attempted
        );
        let top: Vec<String> = payload
            .keyword_frequency()
            .into_iter()
            .take(TOP_KEYWORDS)
            .map(|(k, n)| format!("{k} ({n})"))
            .collect();
        if !top.is_empty() {
            let _ = write!(line, " Top topics: {}.", top.join(", "));
        }
        line
    }

    /// Generate the HTML body.
    #[must_use]
    pub fn generate_html(payload: &DigestPayload, date: NaiveDate) -> String {
        let mut sections = String::new();

        if payload.is_empty() {
            sections.push_str(r#"<p class="muted">Nothing matched today.</p>"#);
        }

        for group in &payload.groups {
            let _ = write!(
                sections,
                r#"
        <div class="section">
            <h2 class="section-title">{name} <span class="handle">@{username}</span></h2>
"#,
                name = html_escape(&group.display_name),
                username = html_escape(&group.username),
            );
            for post in &group.posts {
                sections.push_str(&Self::post_html(post));
            }
            sections.push_str("        </div>\n");
        }

        if !payload.failures.is_empty() {
            sections.push_str(
                r#"
        <div class="section failures">
            <h2 class="section-title">Accounts not collected</h2>
            <ul>
"#,
            );
            for failure in &payload.failures {
                let _ = writeln!(
                    sections,
                    r#"                <li><strong>@{username}</strong>: {reason}</li>"#,
                    username = html_escape(&failure.username),
                    reason = html_escape(&failure.reason),
                );
            }
            sections.push_str("            </ul>\n        </div>\n");
        }

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', sans-serif;
            line-height: 1.6;
            color: #1f2937;
            background-color: #f3f4f6;
            margin: 0;
            padding: 20px;
        }}
        .container {{
            max-width: 700px;
            margin: 0 auto;
            background: #ffffff;
            border-radius: 12px;
            overflow: hidden;
            border: 1px solid #e5e7eb;
        }}
        .header {{
            background: linear-gradient(135deg, #0ea5e9 0%, #06b6d4 100%);
            color: white;
            padding: 24px;
        }}
        .header h1 {{ margin: 0 0 8px 0; font-size: 24px; }}
        .content {{ padding: 24px; }}
        .summary {{ color: #374151; margin-bottom: 24px; }}
        .section {{ margin-bottom: 28px; }}
        .section-title {{
            font-size: 18px;
            margin: 0 0 12px 0;
            padding-bottom: 6px;
            border-bottom: 1px solid #e5e7eb;
        }}
        .handle {{ color: #6b7280; font-weight: normal; font-size: 14px; }}
        .post {{ padding: 12px 0; border-bottom: 1px solid #f3f4f6; }}
        .post .meta {{ color: #6b7280; font-size: 12px; }}
        .tag {{
            display: inline-block;
            background: #e0f2fe;
            color: #0369a1;
            border-radius: 4px;
            padding: 0 6px;
            margin-right: 4px;
            font-size: 12px;
        }}
        .failures {{ color: #b91c1c; }}
        .muted {{ color: #9ca3af; }}
        a {{ color: #0284c7; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>Timeline Digest</h1>
            <div class="subtitle">{date}</div>
        </div>
        <div class="content">
            <p class="summary">{summary}</p>
{sections}
        </div>
    </div>
</body>
</html>
"#,
            date = date.format("%B %d, %Y"),
            summary = html_escape(&Self::summary_line(payload)),
            sections = sections,
        )
    }

    fn post_html(post: &AcceptedPost) -> String {
        let tags = post
            .matched_keywords
            .iter()
            .map(|k| format!(r#"<span class="tag">{}</span>"#, html_escape(k)))
            .collect::<Vec<_>>()
            .join(" ");
        let repost = if post.post.is_repost() {
            format!(" · via @{}", html_escape(&post.post.author))
        } else {
            String::new()
        };

        format!(
            r#"            <div class="post">
                <div class="meta">{time}{repost} · <a href="{url}">view</a></div>
                <p>{text}</p>
                <div>{tags}</div>
            </div>
"#,
            time = post.post.posted_at.format("%Y-%m-%d %H:%M UTC"),
            url = html_escape(&post.post.url),
            text = html_escape(&post.post.text).replace('\n', "<br>"),
        )
    }

    /// Generate the plain-text body.
    #[must_use]
    pub fn generate_text(payload: &DigestPayload, date: NaiveDate) -> String {
        let mut text = format!(
            "Timeline Digest\n{date}\n\n{summary}\n{rule}\n\n",
            date = date.format("%B %d, %Y"),
            summary = Self::summary_line(payload),
            rule = "=".repeat(72),
        );

        for group in &payload.groups {
            let _ = writeln!(text, "{} (@{})", group.display_name, group.username);
            text.push_str(&"-".repeat(40));
            text.push('\n');
            for post in &group.posts {
                let keywords: Vec<&str> = post.matched_keywords.iter().map(String::as_str).collect();
                let _ = write!(
                    text,
                    "[{time}] {body}\n  {url}\n  Keywords: {keywords}\n\n",
                    time = post.post.posted_at.format("%Y-%m-%d %H:%M"),
                    body = post.post.text.replace('\n', "\n  "),
                    url = post.post.url,
                    keywords = keywords.join(", "),
                );
            }
        }

        if !payload.failures.is_empty() {
            text.push_str("Accounts not collected\n");
            text.push_str(&"-".repeat(40));
            text.push('\n');
            for failure in &payload.failures {
                let _ = writeln!(text, "@{}: {}", failure.username, failure.reason);
            }
        }

        text
    }
}

/// Simple HTML escaping for user content.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
