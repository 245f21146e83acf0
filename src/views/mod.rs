//! HTML rendering.
//!
//! Pages are assembled from string fragments; every value that came from a
//! user goes through [`escape`] or [`path_segment`] first.

pub mod pages;

use axum::response::Html;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left readable in URL path segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent-encode a value for use as one URL path segment.
pub fn path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

pub fn user_url(username: &str) -> String {
    format!("/user/{}", path_segment(username))
}

pub fn song_url(username: &str, title: &str) -> String {
    format!("/user/{}/{}", path_segment(username), path_segment(title))
}

pub fn download_url(username: &str, title: &str) -> String {
    format!("/download/{}/{}", path_segment(username), path_segment(title))
}

/// Relative age of a unix timestamp, e.g. "3 minutes ago".
pub fn time_ago(created: i64, now: DateTime<Utc>) -> String {
    let secs = (now.timestamp() - created).max(0);
    let (amount, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };
    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}

/// Wrap page content in the site chrome.
pub fn layout(title: &str, current_user: Option<&str>, content: &str) -> Html<String> {
    let nav = match current_user {
        Some(name) => format!(
            r#"<a href="{profile}">{name}</a> <a href="/active/upload">Upload</a> <a href="/active/settings">Settings</a> <a href="/active/logout">Log out</a>"#,
            profile = escape(&user_url(name)),
            name = escape(name),
        ),
        None => r#"<a href="/guest/login">Log in</a> <a href="/guest/register">Register</a>"#
            .to_string(),
    };

    Html(format!(
        concat!(
            "<!DOCTYPE html>\n",
            r#"<html lang="en"><head><meta charset="utf-8">"#,
            r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#,
            "<title>{title} · Tardigradio</title>",
            r#"<link rel="stylesheet" href="/assets/css/style.css">"#,
            "</head><body>",
            r#"<header><a class="brand" href="/">Tardigradio</a><nav>{nav}</nav></header>"#,
            "<main>{content}</main>",
            r#"<script src="/assets/js/likes.js" defer></script>"#,
            "</body></html>"
        ),
        title = escape(title),
        nav = nav,
        content = content,
    ))
}
