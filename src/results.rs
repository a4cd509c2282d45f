use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::entry::Entry;
use crate::error::TraversalWarning;
use crate::matcher::Score;

/// An entry that matched, with its relevance.
#[derive(Debug, Clone)]
pub struct Match {
    pub entry: Entry,
    pub score: Score,
}

impl Match {
    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// Output order: higher score first, then the shorter path, then the
    /// path's bytes ascending. Total for distinct paths, so the final order
    /// never depends on which worker produced a match first.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.entry.path.as_os_str(), other.entry.path.as_os_str());
        other
            .score
            .cmp(&self.score)
            .then_with(|| a.len().cmp(&b.len()))
            .then_with(|| a.cmp(b))
    }
}

/// Matches in final output order. Built once by the aggregator; never
/// reordered afterwards.
#[derive(Debug, Default, Clone)]
pub struct ResultSet {
    matches: Vec<Match>,
}

impl ResultSet {
    pub(crate) fn from_ranked(matches: Vec<Match>) -> Self {
        Self { matches }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Match> {
        self.matches.iter()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.matches.iter().map(|m| m.entry.path.clone()).collect()
    }

    pub fn into_vec(self) -> Vec<Match> {
        self.matches
    }

    /// Keep only the best `n` matches.
    pub(crate) fn truncate(&mut self, n: usize) {
        self.matches.truncate(n);
    }
}

impl IntoIterator for ResultSet {
    type Item = Match;
    type IntoIter = std::vec::IntoIter<Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Match;
    type IntoIter = std::slice::Iter<'a, Match>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}

/// Performance statistics for a completed walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanStats {
    /// Regular files listed (matched or not).
    pub files: usize,

    /// Directories listed, the roots excluded.
    pub dirs: usize,

    /// Symlinks and special files.
    pub other: usize,

    /// Matches delivered to the caller.
    pub matches: usize,

    /// Wall-clock time from search start to completion.
    pub duration: Duration,

    /// `(files + dirs + other) / duration`, 0 on zero-duration runs.
    pub entries_per_sec: usize,
}

impl ScanStats {
    pub(crate) fn compute(
        files: usize,
        dirs: usize,
        other: usize,
        matches: usize,
        duration: Duration,
    ) -> Self {
        let total = files + dirs + other;
        let eps = if duration.as_secs_f64() > 0.0 {
            (total as f64 / duration.as_secs_f64()) as usize
        } else {
            0
        };
        Self {
            files,
            dirs,
            other,
            matches,
            duration,
            entries_per_sec: eps,
        }
    }

    pub fn entries(&self) -> usize {
        self.files + self.dirs + self.other
    }
}

/// How a search that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Success,
    /// Some subtrees were skipped; see [`SearchResults::warnings`].
    CompletedWithWarnings,
}

/// Everything a batch search produces.
#[derive(Debug)]
pub struct SearchResults {
    pub matches:   ResultSet,
    pub warnings:  Vec<TraversalWarning>,
    pub stats:     ScanStats,
    /// The walk was stopped early by a cancel request or a reached limit.
    pub cancelled: bool,
}

impl SearchResults {
    pub fn status(&self) -> SearchStatus {
        if self.warnings.is_empty() {
            SearchStatus::Success
        } else {
            SearchStatus::CompletedWithWarnings
        }
    }
}
