//! Orderings for launchable entries.

use crate::entry::AppEntry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Base order selected by the user; pins always float above it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Alphabetical,
    Recent,
    Usage,
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Alphabetical => write!(f, "alphabetical"),
            SortOrder::Recent => write!(f, "recent"),
            SortOrder::Usage => write!(f, "usage"),
        }
    }
}

/// Case-insensitive by label.
pub fn alphabetical(lhs: &AppEntry, rhs: &AppEntry) -> Ordering {
    lhs.label()
        .to_lowercase()
        .cmp(&rhs.label().to_lowercase())
}

/// Most recently launched first. Ties stay where the stable sort left them.
pub fn recent(lhs: &AppEntry, rhs: &AppEntry) -> Ordering {
    rhs.last_launch().cmp(&lhs.last_launch())
}

/// Pinned (higher priority) first.
pub fn pin_to_top(lhs: &AppEntry, rhs: &AppEntry) -> Ordering {
    rhs.priority().cmp(&lhs.priority())
}

/// Most used first.
///
/// Usage time is preferred. If any entry in the collection has no usage time,
/// every comparison falls back to launch counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageOrder {
    by_count: bool,
}

impl UsageOrder {
    pub fn for_entries(entries: &[Arc<AppEntry>]) -> Self {
        Self {
            by_count: entries.iter().any(|e| e.usage_time().is_none()),
        }
    }

    pub fn falls_back_to_count(&self) -> bool {
        self.by_count
    }

    pub fn compare(&self, lhs: &AppEntry, rhs: &AppEntry) -> Ordering {
        if self.by_count {
            rhs.usage_count().cmp(&lhs.usage_count())
        } else {
            rhs.usage_time().cmp(&lhs.usage_time())
        }
    }
}
