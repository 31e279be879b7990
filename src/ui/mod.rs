use std::io::Write;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::storage::{ChannelId, DeletedRecord};

/// Presentation side of the watcher: the visible list of deletion records.
pub trait Presenter {
    /// Empties the visible list.
    fn clear(&mut self);
    /// Appends one serialized record to the visible list.
    fn render_record(&mut self, channel_id: &ChannelId, fragment: &str);
    /// Drops the rendered record whose dismiss control has `rendered_id`.
    /// Returns false when no such record is on display.
    fn remove_record(&mut self, rendered_id: &str) -> bool;
    fn render_count(&mut self, count: usize);
    fn set_channel_label(&mut self, channel_id: &ChannelId);
}

/// In-memory visible list, for embedding hosts that draw it themselves.
#[derive(Debug, Clone, Default)]
pub struct RenderedList {
    pub fragments: Vec<String>,
    pub count: usize,
    pub label: Option<ChannelId>,
}

impl Presenter for RenderedList {
    fn clear(&mut self) {
        self.fragments.clear();
    }

    fn render_record(&mut self, _channel_id: &ChannelId, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    fn remove_record(&mut self, rendered_id: &str) -> bool {
        match position_of(&self.fragments, rendered_id) {
            Some(pos) => {
                self.fragments.remove(pos);
                true
            }
            None => false,
        }
    }

    fn render_count(&mut self, count: usize) {
        self.count = count;
    }

    fn set_channel_label(&mut self, channel_id: &ChannelId) {
        self.label = Some(channel_id.clone());
    }
}

/// Line-oriented presenter used by the CLI.
///
/// Keeps the fragments it has printed since the last `clear` so dismissals
/// only report records that are actually on display.
pub struct TerminalPresenter<W: Write> {
    out: W,
    shown: Vec<String>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            shown: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn clear(&mut self) {
        self.shown.clear();
        let _ = writeln!(self.out, "----");
    }

    fn render_record(&mut self, channel_id: &ChannelId, fragment: &str) {
        self.shown.push(fragment.to_string());
        let _ = writeln!(self.out, "{}", format_fragment_line(channel_id, fragment));
    }

    fn remove_record(&mut self, rendered_id: &str) -> bool {
        let Some(pos) = position_of(&self.shown, rendered_id) else {
            return false;
        };
        self.shown.remove(pos);
        let _ = writeln!(self.out, "dismissed {rendered_id}");
        true
    }

    fn render_count(&mut self, count: usize) {
        let _ = writeln!(self.out, "Found {count} messages.");
    }

    fn set_channel_label(&mut self, channel_id: &ChannelId) {
        let _ = writeln!(self.out, "Deleted in {channel_id}");
    }
}

fn position_of(fragments: &[String], rendered_id: &str) -> Option<usize> {
    if rendered_id.is_empty() {
        return None;
    }
    fragments
        .iter()
        .position(|fragment| fragment.contains(rendered_id))
}

pub fn format_record_line(record: &DeletedRecord) -> String {
    let author = if record.author.is_empty() {
        "?"
    } else {
        record.author.as_str()
    };
    format!(
        "{}  {} ({}): {}",
        record.id,
        author,
        record.timestamp_display,
        strip_markup(&record.content_snapshot)
    )
}

/// One readable line for a stored fragment; foreign markup is shown stripped.
pub fn format_fragment_line(channel_id: &ChannelId, fragment: &str) -> String {
    match DeletedRecord::from_fragment(channel_id, fragment) {
        Some(record) => format_record_line(&record),
        None => format!("(unparsed) {}", strip_markup(fragment)),
    }
}

fn strip_markup(markup: &str) -> String {
    static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));
    TAG.replace_all(markup, "").trim().to_string()
}
