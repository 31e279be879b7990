use anyhow::{Context, Result};

use crate::feed::ObservedHandle;
use crate::storage::{ChannelId, KvSlot, RecordStore};
use crate::ui::Presenter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Observation {
    #[default]
    Inactive,
    Active(ObservedHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSwitch {
    Unchanged,
    Switched { loaded: usize },
}

/// Transient state of one watching session.
///
/// `visible_count` mirrors the number of records rendered for
/// `active_channel`.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    active_channel: Option<ChannelId>,
    visible_count: usize,
    observation: Observation,
}

impl SessionState {
    pub fn active_channel(&self) -> Option<&ChannelId> {
        self.active_channel.as_ref()
    }

    pub fn current_count(&self) -> usize {
        self.visible_count
    }

    pub fn observation(&self) -> Observation {
        self.observation
    }

    pub fn is_observing(&self) -> bool {
        matches!(self.observation, Observation::Active(_))
    }

    /// Switches to `channel_id` and renders its stored records.
    pub fn on_channel_changed<S, P>(
        &mut self,
        channel_id: &ChannelId,
        store: &RecordStore<S>,
        presenter: &mut P,
    ) -> Result<ChannelSwitch>
    where
        S: KvSlot,
        P: Presenter + ?Sized,
    {
        if self.active_channel.as_ref() == Some(channel_id) {
            return Ok(ChannelSwitch::Unchanged);
        }
        // a failed load leaves the session on the old channel so the next tick retries
        let fragments = store
            .load_all(channel_id)
            .with_context(|| format!("loading stored records for {channel_id}"))?;
        tracing::info!(channel = %channel_id, "channel changed");
        self.visible_count = 0;
        presenter.clear();
        self.active_channel = Some(channel_id.clone());
        for fragment in &fragments {
            presenter.render_record(channel_id, fragment);
            self.visible_count += 1;
        }
        presenter.set_channel_label(channel_id);
        presenter.render_count(self.visible_count);
        Ok(ChannelSwitch::Switched {
            loaded: fragments.len(),
        })
    }

    pub fn on_record_captured(&mut self) {
        self.visible_count += 1;
    }

    pub fn on_record_dismissed(&mut self) {
        self.visible_count = self.visible_count.saturating_sub(1);
    }

    pub fn arm(&mut self, handle: ObservedHandle) {
        tracing::debug!(handle = handle.0, "observing list container");
        self.observation = Observation::Active(handle);
    }

    pub fn disarm(&mut self) {
        if let Observation::Active(handle) = self.observation {
            tracing::info!(handle = handle.0, "observer disconnected");
        }
        self.observation = Observation::Inactive;
    }

    /// Drops an observed container that is no longer attached so the next
    /// poll can arm a fresh one. Returns true when the handle went stale.
    pub fn check_attached<F>(&mut self, is_attached: F) -> bool
    where
        F: FnOnce(ObservedHandle) -> bool,
    {
        match self.observation {
            Observation::Active(handle) if !is_attached(handle) => {
                tracing::info!(handle = handle.0, "observed container detached");
                self.observation = Observation::Inactive;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::config::DEFAULT_SLOT_KEY;
    use crate::storage::{DeletedRecord, MemorySlot};
    use crate::ui::RenderedList;

    fn store_with(records: &[(&str, u32)]) -> anyhow::Result<RecordStore<MemorySlot>> {
        let store = RecordStore::new(MemorySlot::new(), DEFAULT_SLOT_KEY);
        for (channel, id) in records {
            store.append(&DeletedRecord {
                id: DeletedRecord::record_id(i128::from(*id)),
                channel_id: ChannelId::new(*channel),
                author: String::new(),
                timestamp_raw: String::new(),
                timestamp_display: String::new(),
                content_snapshot: format!("content {id}"),
            })?;
        }
        Ok(store)
    }

    #[test]
    fn channel_switch_resets_count_to_loaded_records() -> anyhow::Result<()> {
        let store = store_with(&[("a", 1), ("a", 2), ("a", 3), ("b", 4)])?;
        let mut session = SessionState::default();
        let mut list = RenderedList::default();

        session.on_channel_changed(&ChannelId::new("a"), &store, &mut list)?;
        assert_eq!(session.current_count(), 3);
        session.on_record_captured();
        session.on_record_dismissed();
        session.on_record_captured();
        assert_eq!(session.current_count(), 4);

        let switch = session.on_channel_changed(&ChannelId::new("b"), &store, &mut list)?;
        assert_eq!(switch, ChannelSwitch::Switched { loaded: 1 });
        assert_eq!(session.current_count(), 1);
        assert_eq!(list.fragments.len(), 1);
        assert_eq!(list.count, 1);
        assert_eq!(list.label, Some(ChannelId::new("b")));
        Ok(())
    }

    #[test]
    fn same_channel_is_a_no_op() -> anyhow::Result<()> {
        let store = store_with(&[("a", 1)])?;
        let mut session = SessionState::default();
        let mut list = RenderedList::default();
        let channel = ChannelId::new("a");

        session.on_channel_changed(&channel, &store, &mut list)?;
        session.on_record_captured();
        let switch = session.on_channel_changed(&channel, &store, &mut list)?;
        assert_eq!(switch, ChannelSwitch::Unchanged);
        assert_eq!(session.current_count(), 2);
        assert_eq!(list.fragments.len(), 1);
        Ok(())
    }

    #[test]
    fn empty_channel_starts_at_zero() -> anyhow::Result<()> {
        let store = store_with(&[("a", 1)])?;
        let mut session = SessionState::default();
        let mut list = RenderedList::default();
        session.on_channel_changed(&ChannelId::new("a"), &store, &mut list)?;
        session.on_channel_changed(&ChannelId::new("100/200"), &store, &mut list)?;
        assert_eq!(session.current_count(), 0);
        assert!(list.fragments.is_empty());
        assert_eq!(session.active_channel(), Some(&ChannelId::new("100/200")));
        Ok(())
    }

    /// Fails the first `failures` reads, then defers to the inner slot.
    struct FlakySlot {
        inner: MemorySlot,
        failures: Cell<usize>,
    }

    impl KvSlot for FlakySlot {
        fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                anyhow::bail!("database is locked");
            }
            self.inner.read(key)
        }

        fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.inner.write(key, value)
        }
    }

    #[test]
    fn failed_load_keeps_previous_channel_and_retries() -> anyhow::Result<()> {
        let seeded = store_with(&[("9/9", 1), ("9/9", 2)])?;
        let store = RecordStore::new(
            FlakySlot {
                inner: seeded.slot().clone(),
                failures: Cell::new(1),
            },
            DEFAULT_SLOT_KEY,
        );
        let mut session = SessionState::default();
        let mut list = RenderedList::default();
        let channel = ChannelId::new("9/9");

        let err = session
            .on_channel_changed(&channel, &store, &mut list)
            .expect_err("first load fails");
        assert!(format!("{err:#}").contains("loading stored records for 9/9"));
        assert_eq!(session.active_channel(), None);
        assert_eq!(list.label, None);

        let switch = session.on_channel_changed(&channel, &store, &mut list)?;
        assert_eq!(switch, ChannelSwitch::Switched { loaded: 2 });
        assert_eq!(session.current_count(), 2);
        assert_eq!(list.fragments.len(), 2);
        Ok(())
    }

    #[test]
    fn dismissal_never_goes_below_zero() {
        let mut session = SessionState::default();
        session.on_record_dismissed();
        assert_eq!(session.current_count(), 0);
    }

    #[test]
    fn detached_handle_turns_observation_inactive() {
        let mut session = SessionState::default();
        assert!(!session.check_attached(|_| false));

        session.arm(ObservedHandle(7));
        assert!(!session.check_attached(|handle| handle == ObservedHandle(7)));
        assert_eq!(session.observation(), Observation::Active(ObservedHandle(7)));

        assert!(session.check_attached(|_| false));
        assert!(!session.is_observing());

        session.arm(ObservedHandle(8));
        session.disarm();
        assert_eq!(session.observation(), Observation::Inactive);
    }
}
