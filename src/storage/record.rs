use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of every record id; the id doubles as the DOM id of the rendered
/// dismiss control.
pub const RECORD_ID_PREFIX: &str = "delmsg";

const CONTENT_SEPARATOR: &str = " <br /> ";
const FRAGMENT_CLOSE: &str = "</div>";

/// Key of one conversation's bucket in the channel log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Everything after the first `marker` in a navigation path, or `default`
    /// when the path has no marker or nothing follows it.
    pub fn from_path(path: &str, marker: &str, default: &str) -> Self {
        let channel = path
            .find(marker)
            .map(|start| &path[start + marker.len()..])
            .filter(|rest| !rest.is_empty())
            .unwrap_or(default);
        Self::new(channel)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One reconstructed deletion. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRecord {
    pub id: String,
    pub channel_id: ChannelId,
    /// Display name; empty when neither the item nor a predecessor had one.
    pub author: String,
    pub timestamp_raw: String,
    pub timestamp_display: String,
    /// Content markup followed by attachment markup.
    pub content_snapshot: String,
}

impl DeletedRecord {
    pub fn record_id(captured_at_millis: i128) -> String {
        format!("{RECORD_ID_PREFIX}{captured_at_millis}")
    }

    /// Serialized form kept in the channel log and handed to the presenter.
    pub fn to_fragment(&self) -> String {
        let id = html_escape(&self.id);
        let author = html_escape(&self.author);
        let display = html_escape(&self.timestamp_display);
        format!(
            "<div class=\"delmsgborder\" data-delmsg=\"{id}\" data-author=\"{author}\" \
             data-datetime=\"{raw}\" data-display=\"{display}\">\
             <div id=\"{id}\" class=\"right-onhover-btn\" style=\"position:absolute;\">X</div> \
             <b>{author}</b> ({display}){CONTENT_SEPARATOR}{content}{FRAGMENT_CLOSE}",
            raw = html_escape(&self.timestamp_raw),
            content = self.content_snapshot,
        )
    }

    /// Parses a fragment written by [`DeletedRecord::to_fragment`].
    ///
    /// Returns `None` for markup in any other shape.
    pub fn from_fragment(channel_id: &ChannelId, fragment: &str) -> Option<Self> {
        static HEADER: Lazy<Regex> = Lazy::new(|| {
            Regex::new(
                r#"^<div class="delmsgborder" data-delmsg="([^"]*)" data-author="([^"]*)" data-datetime="([^"]*)" data-display="([^"]*)">"#,
            )
            .expect("valid fragment header pattern")
        });
        let captures = HEADER.captures(fragment)?;
        let header_len = captures.get(0)?.end();
        let body = &fragment[header_len..];
        let separator = body.find(CONTENT_SEPARATOR)?;
        let content = body[separator + CONTENT_SEPARATOR.len()..].strip_suffix(FRAGMENT_CLOSE)?;
        Some(Self {
            id: html_unescape(&captures[1]),
            channel_id: channel_id.clone(),
            author: html_unescape(&captures[2]),
            timestamp_raw: html_unescape(&captures[3]),
            timestamp_display: html_unescape(&captures[4]),
            content_snapshot: content.to_string(),
        })
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

fn html_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
