//! Stackable filters applied to an entry after its name has matched.
//!
//! The name pattern decides *whether* and *how well* an entry matches;
//! filters only veto. They run after scoring so metadata is read for
//! candidates alone, never for every entry of the tree.

use std::time::{Duration, SystemTime};

use crate::entry::{Entry, EntryKind};

/// A predicate over a matched entry.
///
/// `Send + Sync` because one filter instance is shared by every worker.
/// Filters receive `&mut Entry` so they can populate
/// [`Entry::metadata`] on first use.
pub trait EntryFilter: Send + Sync {
    fn accepts(&self, entry: &mut Entry) -> bool;
}

/// Keep entries of the listed kinds.
///
/// A symlink that was followed into a directory reports
/// [`EntryKind::Symlink`]; `Dir` in the list also admits it.
#[derive(Debug, Clone)]
pub struct KindFilter {
    kinds: Vec<EntryKind>,
}

impl KindFilter {
    pub fn new(kinds: impl IntoIterator<Item = EntryKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn dirs() -> Self {
        Self::new([EntryKind::Dir])
    }
}

impl EntryFilter for KindFilter {
    fn accepts(&self, entry: &mut Entry) -> bool {
        if self.kinds.contains(&entry.kind) {
            return true;
        }
        entry.kind == EntryKind::Symlink
            && self.kinds.contains(&EntryKind::Dir)
            && entry.metadata().is_some_and(|m| m.is_dir())
    }
}

/// Keep entries whose permission bits share at least one bit with `mask`.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct PermFilter {
    mask: u32,
}

#[cfg(unix)]
impl PermFilter {
    pub fn new(mask: u32) -> Self {
        Self { mask: mask & 0o7777 }
    }
}

#[cfg(unix)]
impl EntryFilter for PermFilter {
    fn accepts(&self, entry: &mut Entry) -> bool {
        use std::os::unix::fs::PermissionsExt;

        entry
            .metadata()
            .is_some_and(|m| m.permissions().mode() & self.mask != 0)
    }
}

/// Keep entries by modification age, measured from when the filter was
/// built so every worker compares against the same instant.
#[derive(Debug, Clone, Copy)]
pub struct AgeFilter {
    now:          SystemTime,
    older_than:   Option<Duration>,
    younger_than: Option<Duration>,
}

impl AgeFilter {
    pub fn new(older_than: Option<Duration>, younger_than: Option<Duration>) -> Self {
        Self {
            now: SystemTime::now(),
            older_than,
            younger_than,
        }
    }
}

impl EntryFilter for AgeFilter {
    fn accepts(&self, entry: &mut Entry) -> bool {
        let Some(modified) = entry.metadata().and_then(|m| m.modified().ok()) else {
            return false;
        };
        // A timestamp in the future has age zero.
        let age = self.now.duration_since(modified).unwrap_or_default();
        self.older_than.map_or(true, |d| age > d) && self.younger_than.map_or(true, |d| age < d)
    }
}
