use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use crate::app::{Tick, Watcher};
use crate::config::AppConfig;
use crate::feed::{MutationBatch, ObservedHandle};
use crate::storage::{ChannelId, KvSlot, RecordStore};
use crate::ui::{format_fragment_line, TerminalPresenter};

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// JSON-lines feed to replay; `-` reads stdin
    pub feed: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Channel to print (everything after `channels/` in the path); all
    /// channels are summarised when omitted
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DismissArgs {
    /// Channel holding the record
    pub channel: String,
    /// Rendered record id (`delmsg...`)
    pub rendered_id: String,
}

/// One line of a replay feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedEvent {
    Navigate { path: String },
    Tick(Tick),
    Observe { handle: ObservedHandle },
    Batch(MutationBatch),
    Dismiss { rendered_id: String },
}

pub fn replay<S: KvSlot>(
    config: &AppConfig,
    store: RecordStore<S>,
    args: &ReplayArgs,
) -> Result<String> {
    if args.feed.as_os_str() == "-" {
        let stdin = io::stdin();
        return run_replay(config, store, stdin.lock());
    }
    let file = File::open(&args.feed)
        .with_context(|| format!("opening feed {}", args.feed.display()))?;
    run_replay(config, store, BufReader::new(file))
}

fn run_replay<S: KvSlot, R: BufRead>(
    config: &AppConfig,
    store: RecordStore<S>,
    reader: R,
) -> Result<String> {
    let mut watcher = Watcher::new(config, store, TerminalPresenter::new(Vec::new()));
    let mut captured = 0usize;
    let mut rejected = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("reading feed")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event: FeedEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parsing feed line {}", idx + 1))?;
        match event {
            FeedEvent::Navigate { path } => {
                watcher.on_navigation(&path)?;
            }
            FeedEvent::Tick(tick) => {
                watcher.on_tick(&tick)?;
            }
            FeedEvent::Observe { handle } => watcher.observe(handle),
            FeedEvent::Batch(batch) => {
                let report = watcher.handle_batch(&batch)?;
                captured += report.captured.len();
                rejected += report.rejected.len();
            }
            FeedEvent::Dismiss { rendered_id } => {
                watcher.dismiss(&rendered_id)?;
            }
        }
    }
    let mut out = String::from_utf8(watcher.into_presenter().into_inner())
        .context("presenter produced invalid utf-8")?;
    let _ = writeln!(&mut out, "replay: {captured} captured, {rejected} rejected");
    Ok(out)
}

pub fn list<S: KvSlot>(store: &RecordStore<S>, args: &ListArgs) -> Result<String> {
    let Some(channel) = args.channel.as_deref() else {
        return channels(store);
    };
    let channel_id = ChannelId::new(channel);
    let fragments = store.load_all(&channel_id)?;
    if fragments.is_empty() {
        return Ok(format!("No deleted messages stored for {channel_id}.\n"));
    }
    let mut out = String::new();
    let _ = writeln!(&mut out, "Deleted in {channel_id}");
    for fragment in &fragments {
        let _ = writeln!(&mut out, "  {}", format_fragment_line(&channel_id, fragment));
    }
    let _ = writeln!(&mut out, "Found {} messages.", fragments.len());
    Ok(out)
}

pub fn dismiss<S: KvSlot>(store: &RecordStore<S>, args: &DismissArgs) -> Result<String> {
    let rendered_id = args.rendered_id.trim();
    if rendered_id.is_empty() {
        bail!("rendered id cannot be empty");
    }
    let channel_id = ChannelId::new(args.channel.as_str());
    let removed = store.remove_by_rendered_id(&channel_id, rendered_id)?;
    Ok(format!("Removed {removed} record(s) from {channel_id}.\n"))
}

pub fn channels<S: KvSlot>(store: &RecordStore<S>) -> Result<String> {
    let summaries = store.channels()?;
    if summaries.is_empty() {
        return Ok("No deleted messages stored.\n".to_string());
    }
    let mut out = String::new();
    for summary in summaries {
        let _ = writeln!(&mut out, "{}  {} messages", summary.channel_id, summary.records);
    }
    Ok(out)
}
