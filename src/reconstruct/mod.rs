//! Recovers author, time and content of an accepted removal.

use thiserror::Error;
use time::OffsetDateTime;

use crate::feed::{ItemSnapshot, RemovalEvent};
use crate::storage::{ChannelId, DeletedRecord};

mod timestamp;

pub use timestamp::display_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error("removed item carries no content marker")]
    MissingContent,
}

/// Source of capture instants; record ids derive from it.
pub trait Clock {
    fn now_millis(&self) -> i128;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i128 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
    }
}

/// Author label of the nearest preceding item that has one.
///
/// Grouped messages only label the first item of a run.
pub fn inherit_author(preceding: &[ItemSnapshot]) -> Option<&str> {
    preceding.iter().find_map(|item| item.author.as_deref())
}

pub fn reconstruct(
    removal: &RemovalEvent,
    channel_id: &ChannelId,
    captured_at_millis: i128,
) -> Result<DeletedRecord, ReconstructError> {
    let item = &removal.item;
    let content = item
        .content
        .as_deref()
        .ok_or(ReconstructError::MissingContent)?;

    let author = item
        .author
        .as_deref()
        .or_else(|| inherit_author(&removal.preceding))
        .unwrap_or_default()
        .to_string();

    let timestamp_raw = item.timestamp.clone().unwrap_or_default();
    let timestamp_display = display_timestamp(&timestamp_raw).into_owned();

    let mut content_snapshot = content.to_string();
    if let Some(accessories) = item.accessories.as_deref() {
        content_snapshot.push_str(accessories);
    }

    Ok(DeletedRecord {
        id: DeletedRecord::record_id(captured_at_millis),
        channel_id: channel_id.clone(),
        author,
        timestamp_raw,
        timestamp_display,
        content_snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RemovedItem;

    fn removal(item: RemovedItem, preceding: Vec<ItemSnapshot>) -> RemovalEvent {
        let list_len_before = preceding.len() + 1;
        RemovalEvent {
            item,
            preceding,
            list_len_before,
        }
    }

    fn continuation(content: &str) -> RemovedItem {
        RemovedItem {
            content: Some(content.into()),
            timestamp: Some("2022-09-16T00:20:04.702Z".into()),
            ..RemovedItem::default()
        }
    }

    #[test]
    fn own_author_wins_over_preceding() -> anyhow::Result<()> {
        let item = RemovedItem {
            author: Some("QQAdmin".into()),
            ..continuation("sdfsdf")
        };
        let preceding = vec![ItemSnapshot::new("m1", Some("someone else"))];
        let record = reconstruct(&removal(item, preceding), &ChannelId::new("100/200"), 42)?;
        assert_eq!(record.author, "QQAdmin");
        assert_eq!(record.id, "delmsg42");
        assert_eq!(record.timestamp_display, "00:20 16/09/22");
        Ok(())
    }

    #[test]
    fn missing_author_is_inherited_from_nearest_labelled_sibling() -> anyhow::Result<()> {
        let preceding = vec![
            ItemSnapshot::new("m3", None),
            ItemSnapshot::new("m2", Some("nearest")),
            ItemSnapshot::new("m1", Some("farther")),
        ];
        let record = reconstruct(
            &removal(continuation("hi"), preceding),
            &ChannelId::new("1"),
            1,
        )?;
        assert_eq!(record.author, "nearest");
        Ok(())
    }

    #[test]
    fn author_is_empty_when_nobody_is_labelled() -> anyhow::Result<()> {
        let preceding = vec![ItemSnapshot::new("m2", None), ItemSnapshot::new("m1", None)];
        let record = reconstruct(&removal(continuation("hi"), preceding), &ChannelId::new("1"), 1)?;
        assert_eq!(record.author, "");

        let record = reconstruct(&removal(continuation("hi"), Vec::new()), &ChannelId::new("1"), 1)?;
        assert_eq!(record.author, "");
        Ok(())
    }

    #[test]
    fn content_snapshot_appends_accessories() -> anyhow::Result<()> {
        let item = RemovedItem {
            accessories: Some("<div id=\"message-accessories-7\"><img src=\"x.png\"></div>".into()),
            ..continuation("look")
        };
        let record = reconstruct(&removal(item, Vec::new()), &ChannelId::new("1"), 7)?;
        assert_eq!(
            record.content_snapshot,
            "look<div id=\"message-accessories-7\"><img src=\"x.png\"></div>"
        );

        let record = reconstruct(&removal(continuation("plain"), Vec::new()), &ChannelId::new("1"), 8)?;
        assert_eq!(record.content_snapshot, "plain");
        Ok(())
    }

    #[test]
    fn missing_content_fails() {
        let item = RemovedItem {
            author: Some("x".into()),
            ..RemovedItem::default()
        };
        let err = reconstruct(&removal(item, Vec::new()), &ChannelId::new("1"), 1);
        assert_eq!(err, Err(ReconstructError::MissingContent));
    }

    #[test]
    fn unrecognised_year_keeps_raw_timestamp() -> anyhow::Result<()> {
        let item = RemovedItem {
            timestamp: Some("1999-01-01T10:00:00.000Z".into()),
            ..continuation("old")
        };
        let record = reconstruct(&removal(item, Vec::new()), &ChannelId::new("1"), 1)?;
        assert_eq!(record.timestamp_display, record.timestamp_raw);
        Ok(())
    }

    #[test]
    fn system_clock_reports_milliseconds() {
        let millis = SystemClock.now_millis();
        // 2020-01-01 in milliseconds
        assert!(millis > 1_577_836_800_000);
    }
}
