//! Continuation policy for paged catalog fetches.
//!
//! The scrape stage keeps paging until one of the stop rules trips.
//! Every stop is deliberate and carries a reason that lands in the run
//! metrics, so a truncated catalog is always distinguishable from an
//! exhausted one.

use crate::config::ScrapeConfig;
use crate::ports::ContentPage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Why a paged fetch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The wall-clock budget for the fetch ran out.
    TimeBudget,
    /// The item cap was reached.
    ItemCap,
    /// The page cap was reached.
    PageCap,
    /// The source returned the same cursor it was asked with.
    CursorStalled,
    /// Too many consecutive pages yielded nothing new.
    DiminishingReturns,
    /// The source reported no further pages.
    SourceExhausted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TimeBudget => "time_budget",
            Self::ItemCap => "item_cap",
            Self::PageCap => "page_cap",
            Self::CursorStalled => "cursor_stalled",
            Self::DiminishingReturns => "diminishing_returns",
            Self::SourceExhausted => "source_exhausted",
        };
        write!(f, "{s}")
    }
}

impl StopReason {
    /// Whether the fetch saw the whole catalog rather than a cap or guard.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::SourceExhausted)
    }
}

/// Tracks fetch progress and decides when to stop paging.
///
/// Rules are checked in a fixed order after every page, so the recorded
/// reason is deterministic even when several rules trip at once.
#[derive(Debug)]
pub struct ContinuationPolicy {
    config: ScrapeConfig,
    started: Instant,
    pages_fetched: u32,
    items_collected: usize,
    stale_streak: u32,
}

impl ContinuationPolicy {
    /// Creates a policy with the clock starting now.
    #[must_use]
    pub fn new(config: ScrapeConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            pages_fetched: 0,
            items_collected: 0,
            stale_streak: 0,
        }
    }

    /// Records a fetched page and decides whether to keep going.
    ///
    /// `new_items` counts items not already held for the creator and
    /// `requested_cursor` is the cursor the page was fetched with.
    /// Returns `Some(reason)` when paging must stop.
    pub fn observe_page(
        &mut self,
        page: &ContentPage,
        new_items: usize,
        requested_cursor: Option<&str>,
    ) -> Option<StopReason> {
        self.pages_fetched += 1;
        self.items_collected += new_items;
        if new_items == 0 {
            self.stale_streak += 1;
        } else {
            self.stale_streak = 0;
        }

        if self.started.elapsed() >= Duration::from_millis(self.config.time_budget_ms) {
            return Some(StopReason::TimeBudget);
        }
        if self.items_collected >= self.config.max_items {
            return Some(StopReason::ItemCap);
        }
        if self.pages_fetched >= self.config.max_pages {
            return Some(StopReason::PageCap);
        }
        // A source that hands back the cursor it was asked with would
        // loop forever; `None == None` also catches a first page that
        // claims more content but offers no way to reach it.
        if page.has_more && page.next_cursor.as_deref() == requested_cursor {
            return Some(StopReason::CursorStalled);
        }
        if self.stale_streak >= self.config.max_stale_pages {
            return Some(StopReason::DiminishingReturns);
        }
        if !page.has_more {
            return Some(StopReason::SourceExhausted);
        }
        None
    }

    /// Pages observed so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// New items observed so far.
    #[must_use]
    pub fn items_collected(&self) -> usize {
        self.items_collected
    }
}
