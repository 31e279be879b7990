//! Wires the feed, filter, reconstructor, store and session together.
//!
//! Every handler runs to completion on the caller's thread. The host calls
//! [`Watcher::on_tick`] from its polling timer and [`Watcher::handle_batch`]
//! from its mutation callback; the two never overlap.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::config::{AppConfig, SessionOptions};
use crate::feed::{ListSnapshot, MutationBatch, ObservedHandle, RemovalNotice};
use crate::filter::{RecyclingFilter, RejectReason, Verdict};
use crate::reconstruct::{self, Clock, ReconstructError, SystemClock};
use crate::storage::{ChannelId, DeletedRecord, KvSlot, RecordStore};
use crate::ui::Presenter;

pub mod state;

pub use state::{ChannelSwitch, Observation, SessionState};

/// What the polling loop saw on one tick.
///
/// Hosts send one every [`Watcher::poll_interval`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Current navigation path.
    pub path: String,
    /// Whether the container being observed is still attached.
    #[serde(default = "attached_by_default")]
    pub attached: bool,
    /// A mounted message list container, if one is visible.
    #[serde(default)]
    pub candidate: Option<ObservedHandle>,
}

impl Default for Tick {
    fn default() -> Self {
        Self {
            path: String::new(),
            attached: attached_by_default(),
            candidate: None,
        }
    }
}

fn attached_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub armed: Option<ObservedHandle>,
    pub went_stale: bool,
    pub channel: ChannelSwitch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Recorded(DeletedRecord),
    Rejected(RejectReason),
    Dropped(ReconstructError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub captured: Vec<DeletedRecord>,
    pub rejected: Vec<RejectReason>,
    pub dropped: usize,
}

impl BatchReport {
    fn push(&mut self, capture: Capture) {
        match capture {
            Capture::Recorded(record) => self.captured.push(record),
            Capture::Rejected(reason) => self.rejected.push(reason),
            Capture::Dropped(_) => self.dropped += 1,
        }
    }
}

pub struct Watcher<S, P, C = SystemClock> {
    filter: RecyclingFilter,
    store: RecordStore<S>,
    presenter: P,
    clock: C,
    options: SessionOptions,
    session: SessionState,
    list: ListSnapshot,
    last_record_id: Option<String>,
}

impl<S: KvSlot, P: Presenter> Watcher<S, P, SystemClock> {
    pub fn new(config: &AppConfig, store: RecordStore<S>, presenter: P) -> Self {
        Self::with_clock(config, store, presenter, SystemClock)
    }
}

impl<S: KvSlot, P: Presenter, C: Clock> Watcher<S, P, C> {
    pub fn with_clock(config: &AppConfig, store: RecordStore<S>, presenter: P, clock: C) -> Self {
        Self {
            filter: RecyclingFilter::new(config.filter),
            store,
            presenter,
            clock,
            options: config.session.clone(),
            session: SessionState::default(),
            list: ListSnapshot::default(),
            last_record_id: None,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    pub fn list(&self) -> &ListSnapshot {
        &self.list
    }

    pub fn poll_interval(&self) -> Duration {
        self.options.poll_interval()
    }

    /// Channel records are filed under; the default sentinel before any
    /// channel was seen.
    pub fn active_channel(&self) -> ChannelId {
        self.session
            .active_channel()
            .cloned()
            .unwrap_or_else(|| ChannelId::new(self.options.default_channel.clone()))
    }

    pub fn channel_for_path(&self, path: &str) -> ChannelId {
        ChannelId::from_path(
            path,
            &self.options.channel_marker,
            &self.options.default_channel,
        )
    }

    pub fn on_channel_changed(&mut self, channel_id: &ChannelId) -> Result<ChannelSwitch> {
        self.session
            .on_channel_changed(channel_id, &self.store, &mut self.presenter)
    }

    pub fn on_navigation(&mut self, path: &str) -> Result<ChannelSwitch> {
        let channel_id = self.channel_for_path(path);
        self.on_channel_changed(&channel_id)
    }

    /// One pass of the host's polling loop: re-arm observation and pick up
    /// channel changes.
    pub fn on_tick(&mut self, tick: &Tick) -> Result<TickOutcome> {
        let mut armed = None;
        let mut went_stale = false;
        if self.is_channel_path(&tick.path) {
            went_stale = self.session.check_attached(|_| tick.attached);
            if !self.session.is_observing() {
                if let Some(handle) = tick.candidate {
                    self.observe(handle);
                    armed = Some(handle);
                }
            }
        } else if self.session.is_observing() {
            self.session.disarm();
        }
        let channel = self.on_navigation(&tick.path)?;
        Ok(TickOutcome {
            armed,
            went_stale,
            channel,
        })
    }

    /// Starts watching a freshly mounted list container.
    pub fn observe(&mut self, handle: ObservedHandle) {
        self.list.clear();
        self.session.arm(handle);
    }

    pub fn handle_batch(&mut self, batch: &MutationBatch) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if !self.session.is_observing() {
            tracing::debug!(
                notices = batch.notices.len(),
                "ignoring mutations while not observing"
            );
            return Ok(report);
        }
        for notice in self.list.apply(batch) {
            report.push(self.process_removal(&notice)?);
        }
        Ok(report)
    }

    /// Classifies one removal and records it when it is a real deletion.
    pub fn process_removal(&mut self, notice: &RemovalNotice) -> Result<Capture> {
        if let Verdict::Reject(reason) = self.filter.evaluate(&notice.event, &notice.signals) {
            tracing::trace!(%reason, "removal rejected");
            return Ok(Capture::Rejected(reason));
        }

        let channel_id = self.active_channel();
        let record =
            match reconstruct::reconstruct(&notice.event, &channel_id, self.clock.now_millis()) {
                Ok(record) => record,
                Err(err) => {
                    tracing::debug!(%err, "dropping removal that could not be reconstructed");
                    return Ok(Capture::Dropped(err));
                }
            };
        if self.last_record_id.as_deref() == Some(record.id.as_str()) {
            // ids come from a millisecond clock; dismissing either record removes both
            tracing::warn!(id = %record.id, "record id collides with the previous capture");
        }

        self.store.append(&record)?;
        self.presenter.render_record(&channel_id, &record.to_fragment());
        self.session.on_record_captured();
        self.presenter.render_count(self.session.current_count());
        tracing::info!(channel = %channel_id, id = %record.id, author = %record.author, "captured deleted message");

        self.last_record_id = Some(record.id.clone());
        Ok(Capture::Recorded(record))
    }

    /// Handles the user dismissing one rendered record.
    pub fn dismiss(&mut self, rendered_id: &str) -> Result<usize> {
        let channel_id = self.active_channel();
        let removed = self.store.remove_by_rendered_id(&channel_id, rendered_id)?;
        if removed == 0 {
            tracing::debug!(rendered_id, channel = %channel_id, "no stored record matched dismissal");
        }
        if self.presenter.remove_record(rendered_id) {
            self.session.on_record_dismissed();
            self.presenter.render_count(self.session.current_count());
        }
        Ok(removed)
    }

    fn is_channel_path(&self, path: &str) -> bool {
        path.trim_start_matches('/')
            .starts_with(self.options.channel_marker.as_str())
    }
}
