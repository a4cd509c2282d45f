//! ResultAggregator: merge matches from concurrent workers into one order.
//!
//! Two modes:
//!
//! - [`collect`] buffers everything, then sorts. The result is fully
//!   deterministic for a given tree, whatever the worker count.
//! - [`Streaming`] re-orders through a bounded window: it holds at most
//!   `window` matches and releases the best of them whenever the window is
//!   full. First results show up early; the global order is only
//!   approximate, but nothing is ever lost.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::results::{Match, ResultSet};

/// Drain `matches` and return them ranked.
pub fn collect<I>(matches: I) -> ResultSet
where
    I: IntoIterator<Item = Match>,
{
    let mut all: Vec<Match> = matches.into_iter().collect();
    all.sort_by(Match::rank_cmp);
    ResultSet::from_ranked(all)
}

/// Best-first adapter over an arrival-order match stream.
pub struct Streaming<I> {
    inner:     I,
    window:    BinaryHeap<Ranked>,
    size:      usize,
    remaining: Option<usize>,
    done:      bool,
}

impl<I: Iterator<Item = Match>> Streaming<I> {
    /// `window` is clamped to at least one; a window of one passes matches
    /// through unchanged.
    pub fn new(inner: I, window: usize) -> Self {
        let size = window.max(1);
        Self {
            inner,
            window: BinaryHeap::with_capacity(size),
            size,
            remaining: None,
            done: false,
        }
    }

    /// Stop after yielding `n` matches. The inner iterator is not drained
    /// further.
    pub fn limit(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Give back the underlying iterator. Matches still held in the
    /// window are dropped.
    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: Iterator<Item = Match>> Iterator for Streaming<I> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        match &mut self.remaining {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }
        while !self.done && self.window.len() < self.size {
            match self.inner.next() {
                Some(m) => self.window.push(Ranked(m)),
                None => self.done = true,
            }
        }
        self.window.pop().map(|r| r.0)
    }
}

/// Heap wrapper: the max-heap top is the best-ranked match.
struct Ranked(Match);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // rank_cmp puts the best first; the heap pops the greatest.
        other.0.rank_cmp(&self.0)
    }
}
