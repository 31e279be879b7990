//! Tells genuine deletions apart from virtualization noise.

use strum::{Display, IntoStaticStr};

use crate::config::FilterThresholds;
use crate::feed::{AmbientSignals, RemovalEvent, ScrollMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum RejectReason {
    /// The view jumped to older history; surrounding removals are expected.
    HistoricalJump,
    /// Long, partially scrolled list discarding off-screen items.
    ScrollVirtualization,
    /// Not a list item, no content marker, or an unconfirmed local send.
    NotAMessage,
    /// Item trimmed from the head of a long list.
    BoundaryTrim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecyclingFilter {
    thresholds: FilterThresholds,
}

impl RecyclingFilter {
    pub fn new(thresholds: FilterThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FilterThresholds {
        &self.thresholds
    }

    pub fn accept(&self, removal: &RemovalEvent, signals: &AmbientSignals) -> bool {
        self.evaluate(removal, signals).is_accept()
    }

    /// Runs the rejection rules in order; the first match wins.
    pub fn evaluate(&self, removal: &RemovalEvent, signals: &AmbientSignals) -> Verdict {
        if signals.historical_jump {
            return Verdict::Reject(RejectReason::HistoricalJump);
        }
        if let Some(scroll) = &signals.scroll {
            if self.is_scroll_pruning(scroll) {
                return Verdict::Reject(RejectReason::ScrollVirtualization);
            }
        }
        let item = &removal.item;
        if !item.is_list_item() || !item.has_content() || item.sending {
            return Verdict::Reject(RejectReason::NotAMessage);
        }
        if removal.preceding_count() < self.thresholds.boundary_window
            && removal.list_len_before > self.thresholds.boundary_list_len()
        {
            return Verdict::Reject(RejectReason::BoundaryTrim);
        }
        Verdict::Accept
    }

    fn is_scroll_pruning(&self, scroll: &ScrollMetrics) -> bool {
        // scroll_top of zero means the list sits at the very top: nothing to prune above
        if scroll.scroll_height <= self.thresholds.scroll_height_threshold
            || scroll.scroll_top == 0.0
        {
            return false;
        }
        scroll.scroll_height / scroll.scroll_top > self.thresholds.scroll_ratio_threshold
    }
}
