//! # fu
//!
//! Fast parallel file finder: exact, glob, fuzzy and regex name patterns
//! over a directory tree walked by a work-stealing thread pool.
//!
//! The library owns pattern compilation, scoring, the walk engine, the
//! in-memory shallow index used for pruning, and result ordering. The `fu`
//! binary is a thin CLI over [`SearchBuilder`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! let results = fu::search()
//!     .root(".")
//!     .pattern("invoice")
//!     .mode(fu::MatchMode::Fuzzy)
//!     .run()?;
//!
//! for m in &results.matches {
//!     println!("{}", m.path().display());
//! }
//! for w in &results.warnings {
//!     eprintln!("skipped: {w}");
//! }
//! println!(
//!     "Found {} matches in {:.3}s",
//!     results.stats.matches,
//!     results.stats.duration.as_secs_f64()
//! );
//! # Ok::<(), fu::FuError>(())
//! ```
//!
//! # Lower-level pieces
//!
//! Patterns compile once and score anything:
//!
//! ```rust
//! use fu::{score, Pattern};
//!
//! let p: Pattern = "*.txt".parse().unwrap();
//! assert!(score(&p, "foo.txt").is_some());
//! assert!(score(&p, "zzfoo.log").is_none());
//! ```
//!
//! [`walk()`] gives the raw, unordered match stream; [`collect`] and
//! [`Streaming`] turn it into ranked output.

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod filters;
pub mod index;
pub mod pattern;

mod builder;
mod cancel;
mod entry;
mod error;
mod matcher;
mod results;
mod walker;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use aggregator::{collect, Streaming};
pub use builder::{SearchBuilder, DEFAULT_WINDOW};
pub use cancel::CancelToken;
pub use entry::{Entry, EntryKind};
pub use error::{FuError, TraversalWarning};
pub use index::{NodeId, ShallowIndex};
pub use matcher::{score, Score, Tier, EXACT_FULL, EXACT_SUBSTRING};
pub use pattern::{compile, CompileOptions, ExactMode, MatchMode, Pattern};
pub use results::{Match, ResultSet, ScanStats, SearchResults, SearchStatus};
pub use walker::{walk, walk_with, Walk, WalkOptions, WalkReport};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`SearchBuilder`] to configure and run a search.
///
/// # Example
///
/// ```rust,no_run
/// let results = fu::search()
///     .roots(["src", "tests"])
///     .pattern("src/*.rs")
///     .hidden(false)
///     .run()?;
///
/// assert!(results.matches.iter().all(|m| m.entry.name.ends_with(".rs")));
/// # Ok::<(), fu::FuError>(())
/// ```
pub fn search() -> SearchBuilder {
    SearchBuilder::default()
}
