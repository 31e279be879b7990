//! Channel-keyed log of deletion records.
//!
//! The whole log lives in one slot as a JSON object mapping each channel id
//! to the ordered list of its serialized record fragments:
//!
//! ```json
//! { "100/200": ["<div class=\"delmsgborder\" ...>...</div>"] }
//! ```
//!
//! Every mutation reads the slot, changes the log and rewrites the slot at
//! once. Independent stores on the same slot are not coordinated: concurrent
//! writers lose updates, last writer wins.

use anyhow::{Context, Result};
use indexmap::IndexMap;

use crate::config::StoreOptions;

mod record;
mod schema;
mod slot;

pub use record::{ChannelId, DeletedRecord, RECORD_ID_PREFIX};
pub use slot::{KvSlot, MemorySlot, SqliteSlot};

type ChannelLog = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub records: usize,
}

pub struct RecordStore<S> {
    slot: S,
    key: String,
}

impl<S: KvSlot> RecordStore<S> {
    pub fn new(slot: S, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
        }
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Appends to the record's channel bucket and persists right away.
    pub fn append(&self, record: &DeletedRecord) -> Result<()> {
        let mut log = self.read_log()?;
        log.entry(record.channel_id.as_str().to_string())
            .or_default()
            .push(record.to_fragment());
        self.write_log(&log)
            .with_context(|| format!("appending record {} to {}", record.id, record.channel_id))
    }

    /// Stored fragments of a channel, oldest first.
    pub fn load_all(&self, channel_id: &ChannelId) -> Result<Vec<String>> {
        let mut log = self.read_log()?;
        Ok(log.swap_remove(channel_id.as_str()).unwrap_or_default())
    }

    /// Stored records of a channel, oldest first. Fragments that do not parse
    /// as records are skipped.
    pub fn load_records(&self, channel_id: &ChannelId) -> Result<Vec<DeletedRecord>> {
        let fragments = self.load_all(channel_id)?;
        let total = fragments.len();
        let records: Vec<_> = fragments
            .iter()
            .filter_map(|fragment| DeletedRecord::from_fragment(channel_id, fragment))
            .collect();
        if records.len() != total {
            tracing::warn!(
                channel = %channel_id,
                skipped = total - records.len(),
                "skipping stored fragments that are not deletion records"
            );
        }
        Ok(records)
    }

    /// Removes every fragment of the channel that mentions `rendered_id`.
    ///
    /// Returns how many were removed; nothing is written when none match.
    pub fn remove_by_rendered_id(&self, channel_id: &ChannelId, rendered_id: &str) -> Result<usize> {
        if rendered_id.is_empty() {
            return Ok(0);
        }
        let mut log = self.read_log()?;
        let Some(bucket) = log.get_mut(channel_id.as_str()) else {
            return Ok(0);
        };
        let before = bucket.len();
        bucket.retain(|fragment| !fragment.contains(rendered_id));
        let removed = before - bucket.len();
        if removed == 0 {
            return Ok(0);
        }
        self.write_log(&log)
            .with_context(|| format!("removing {rendered_id} from {channel_id}"))?;
        Ok(removed)
    }

    /// Channels with a bucket, in the order they were first written.
    pub fn channels(&self) -> Result<Vec<ChannelSummary>> {
        Ok(self
            .read_log()?
            .into_iter()
            .map(|(channel, fragments)| ChannelSummary {
                channel_id: ChannelId::new(channel),
                records: fragments.len(),
            })
            .collect())
    }

    fn read_log(&self) -> Result<ChannelLog> {
        let Some(raw) = self.slot.read(&self.key)? else {
            return Ok(ChannelLog::new());
        };
        match serde_json::from_str::<ChannelLog>(&raw) {
            Ok(log) => Ok(log),
            Err(err) => {
                tracing::warn!(%err, key = %self.key, "unreadable channel log, treating it as empty");
                Ok(ChannelLog::new())
            }
        }
    }

    fn write_log(&self, log: &ChannelLog) -> Result<()> {
        let raw = serde_json::to_string(log).context("serialising channel log")?;
        self.slot.write(&self.key, &raw)
    }
}

impl RecordStore<SqliteSlot> {
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let slot = SqliteSlot::open(options)?;
        Ok(Self::new(slot, options.slot_key.clone()))
    }
}
