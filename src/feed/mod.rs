//! Boundary types of the mutation feed.
//!
//! The host (a browser extension, a test harness, the `replay` command) turns
//! its view tree mutations into [`MutationBatch`]es. [`ListSnapshot`] keeps a
//! materialized, ordered copy of the observed list so that author lookups
//! never touch a live tree mid-computation.

use serde::{Deserialize, Serialize};

/// Identity of an observed list container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    #[default]
    ListItem,
    Other,
}

/// A removed node as captured by the adapter at removal time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovedItem {
    pub kind: ItemKind,
    /// Text of the item's own author label, if it carries one.
    pub author: Option<String>,
    /// Raw `datetime` value of the timestamp marker.
    pub timestamp: Option<String>,
    /// Inner markup of the content marker.
    pub content: Option<String>,
    /// Outer markup of the attachment/accessory container.
    pub accessories: Option<String>,
    /// The item is an optimistic local send not yet confirmed remotely.
    pub sending: bool,
}

impl RemovedItem {
    pub fn is_list_item(&self) -> bool {
        self.kind == ItemKind::ListItem
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

/// A list item as last seen by the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub key: String,
    #[serde(default)]
    pub author: Option<String>,
}

impl ItemSnapshot {
    pub fn new(key: impl Into<String>, author: Option<&str>) -> Self {
        Self {
            key: key.into(),
            author: author.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalEvent {
    pub item: RemovedItem,
    /// Siblings that preceded the removed item, nearest first.
    pub preceding: Vec<ItemSnapshot>,
    /// Number of siblings in the list immediately before the removal.
    pub list_len_before: usize,
}

impl RemovalEvent {
    pub fn preceding_count(&self) -> usize {
        self.preceding.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_height: f64,
    pub scroll_top: f64,
}

/// Signals sampled from the surrounding view when a removal is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientSignals {
    /// The view just jumped to older history ("jump to present" is offered).
    pub historical_jump: bool,
    pub scroll: Option<ScrollMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemovalNotice {
    pub event: RemovalEvent,
    pub signals: AmbientSignals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum MutationNotice {
    Added {
        key: String,
        #[serde(default)]
        author: Option<String>,
        /// Insert position; appended when absent.
        #[serde(default)]
        index: Option<usize>,
    },
    Removed {
        key: String,
        #[serde(default)]
        item: RemovedItem,
        #[serde(default)]
        signals: AmbientSignals,
    },
}

/// Structural changes of one observed container, in delivery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    #[serde(default)]
    pub notices: Vec<MutationNotice>,
}

impl MutationBatch {
    pub fn new(notices: Vec<MutationNotice>) -> Self {
        Self { notices }
    }
}

/// Ordered snapshot of the items currently mounted in the observed list.
#[derive(Debug, Clone, Default)]
pub struct ListSnapshot {
    items: Vec<ItemSnapshot>,
}

impl ListSnapshot {
    pub fn from_items(items: Vec<ItemSnapshot>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ItemSnapshot] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn insert(&mut self, index: Option<usize>, item: ItemSnapshot) {
        match index {
            Some(idx) if idx < self.items.len() => self.items.insert(idx, item),
            _ => self.items.push(item),
        }
    }

    /// Removes `key` and describes the removal relative to the list as it
    /// was just before.
    ///
    /// A key the snapshot never saw is treated as the list's tail item, the
    /// position where live messages are usually removed.
    pub fn remove(&mut self, key: &str, item: RemovedItem) -> RemovalEvent {
        match self.items.iter().position(|known| known.key == key) {
            Some(position) => {
                let list_len_before = self.items.len();
                let preceding = self.items[..position].iter().rev().cloned().collect();
                self.items.remove(position);
                RemovalEvent {
                    item,
                    preceding,
                    list_len_before,
                }
            }
            None => {
                tracing::debug!(key, "removal of an item the snapshot never saw");
                RemovalEvent {
                    item,
                    preceding: self.items.iter().rev().cloned().collect(),
                    list_len_before: self.items.len() + 1,
                }
            }
        }
    }

    /// Applies a batch in order and returns its removals for classification.
    pub fn apply(&mut self, batch: &MutationBatch) -> Vec<RemovalNotice> {
        let mut removals = Vec::new();
        for notice in &batch.notices {
            match notice {
                MutationNotice::Added { key, author, index } => {
                    self.insert(*index, ItemSnapshot::new(key.clone(), author.as_deref()));
                }
                MutationNotice::Removed { key, item, signals } => {
                    let event = self.remove(key, item.clone());
                    removals.push(RemovalNotice {
                        event,
                        signals: *signals,
                    });
                }
            }
        }
        removals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(keys: &[(&str, Option<&str>)]) -> ListSnapshot {
        ListSnapshot::from_items(
            keys.iter()
                .map(|(key, author)| ItemSnapshot::new(*key, *author))
                .collect(),
        )
    }

    #[test]
    fn remove_reports_preceding_nearest_first() {
        let mut list = snapshot(&[("a", Some("alice")), ("b", None), ("c", None), ("d", None)]);
        let event = list.remove("c", RemovedItem::default());

        assert_eq!(event.list_len_before, 4);
        let keys: Vec<_> = event.preceding.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn unknown_key_is_treated_as_tail() {
        let mut list = snapshot(&[("a", None), ("b", None)]);
        let event = list.remove("zz", RemovedItem::default());
        assert_eq!(event.preceding_count(), 2);
        assert_eq!(event.list_len_before, 3);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn apply_tracks_additions_between_removals() {
        let mut list = ListSnapshot::default();
        let batch = MutationBatch::new(vec![
            MutationNotice::Added {
                key: "m1".into(),
                author: Some("QQAdmin".into()),
                index: None,
            },
            MutationNotice::Added {
                key: "m2".into(),
                author: None,
                index: None,
            },
            MutationNotice::Added {
                key: "m0".into(),
                author: None,
                index: Some(0),
            },
            MutationNotice::Removed {
                key: "m2".into(),
                item: RemovedItem::default(),
                signals: AmbientSignals::default(),
            },
        ]);

        let removals = list.apply(&batch);
        assert_eq!(removals.len(), 1);
        let event = &removals[0].event;
        assert_eq!(event.list_len_before, 3);
        assert_eq!(event.preceding[0].author.as_deref(), Some("QQAdmin"));
        assert_eq!(event.preceding[1].key, "m0");
        let remaining: Vec<_> = list.items().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(remaining, vec!["m0", "m1"]);
    }

    #[test]
    fn batch_deserializes_from_tagged_json() -> anyhow::Result<()> {
        let raw = r#"{"notices":[
            {"op":"added","key":"m1","author":"bob"},
            {"op":"removed","key":"m1","item":{"content":"hi","timestamp":"2022-09-16T19:20:04.702Z"},
             "signals":{"historical_jump":true}}
        ]}"#;
        let batch: MutationBatch = serde_json::from_str(raw)?;
        assert_eq!(batch.notices.len(), 2);
        match &batch.notices[1] {
            MutationNotice::Removed { item, signals, .. } => {
                assert!(item.is_list_item());
                assert!(item.has_content());
                assert!(signals.historical_jump);
                assert!(signals.scroll.is_none());
            }
            other => panic!("expected removal, got {other:?}"),
        }
        Ok(())
    }
}
