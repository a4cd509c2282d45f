use std::path::PathBuf;
use std::sync::Arc;

use crate::aggregator::{self, Streaming};
use crate::cancel::CancelToken;
use crate::error::FuError;
use crate::filters::EntryFilter;
use crate::index::ShallowIndex;
use crate::pattern::{compile, CompileOptions, ExactMode, MatchMode, Pattern};
use crate::results::SearchResults;
use crate::walker::{default_threads, walk_with, Walk, WalkOptions};

// ---------------------------------------------------------------------------
// SearchBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and executing a search.
///
/// Created via [`fu::search()`](crate::search). Configure with chained
/// builder methods, then call [`run()`](SearchBuilder::run) for a ranked
/// batch, [`stream()`](SearchBuilder::stream) for early results, or
/// [`walk()`](SearchBuilder::walk) for raw arrival order.
///
/// # Example
///
/// ```rust,no_run
/// let results = fu::search()
///     .root("src")
///     .pattern("*.rs")
///     .limit(10)
///     .threads(8)
///     .run()?;
///
/// for m in &results.matches {
///     println!("{} {}", m.score, m.path().display());
/// }
/// # Ok::<(), fu::FuError>(())
/// ```
pub struct SearchBuilder {
    roots:             Vec<PathBuf>,
    pattern:           Option<String>,
    mode:              MatchMode,
    case_sensitive:    bool,
    exact:             ExactMode,
    limit:             Option<usize>,
    threads:           usize,
    max_depth:         Option<usize>,
    include_hidden:    bool,
    follow_links:      bool,
    ignore_globs:      Vec<String>,
    filters:           Vec<Box<dyn EntryFilter>>,
    exclude:           bool,
    window:            Option<usize>,
    channel_capacity:  usize,
    shallow_threshold: usize,
    cancel:            CancelToken,
}

impl Default for SearchBuilder {
    fn default() -> Self {
        let walk = WalkOptions::default();
        Self {
            roots:             Vec::new(),
            pattern:           None,
            mode:              MatchMode::Auto,
            case_sensitive:    true,
            exact:             ExactMode::Full,
            limit:             None,
            threads:           default_threads(),
            max_depth:         walk.max_depth,
            include_hidden:    walk.include_hidden,
            follow_links:      walk.follow_links,
            ignore_globs:      Vec::new(),
            filters:           Vec::new(),
            exclude:           walk.invert_filters,
            window:            None,
            channel_capacity:  walk.channel_capacity,
            shallow_threshold: ShallowIndex::DEFAULT_THRESHOLD,
            cancel:            CancelToken::new(),
        }
    }
}

/// Default re-ordering window for [`SearchBuilder::streaming`].
pub const DEFAULT_WINDOW: usize = 64;

impl SearchBuilder {
    // ── Where ─────────────────────────────────────────────────────────────

    /// Add a search root. The current directory is used when none is given.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.roots.push(path.into());
        self
    }

    pub fn roots<P: Into<PathBuf>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.roots.extend(paths.into_iter().map(Into::into));
        self
    }

    // ── What ──────────────────────────────────────────────────────────────

    /// The raw pattern. Compiled when the search starts.
    pub fn pattern(mut self, raw: impl Into<String>) -> Self {
        self.pattern = Some(raw.into());
        self
    }

    /// How the pattern is interpreted. [`MatchMode::Auto`] by default.
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Case-sensitive by default. Fuzzy patterns ignore case regardless.
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Full-name equality (default) or substring for exact patterns.
    pub fn exact_mode(mut self, exact: ExactMode) -> Self {
        self.exact = exact;
        self
    }

    /// Veto matches that fail `filter`. Filters stack.
    pub fn filter(mut self, filter: impl EntryFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Invert the filter stack: keep name matches that fail at least one
    /// filter and drop those that pass them all.
    pub fn exclude(mut self, yes: bool) -> Self {
        self.exclude = yes;
        self
    }

    /// Skip entries matching a gitignore-syntax glob. Ignored directories
    /// are not entered.
    pub fn ignore(mut self, glob: impl Into<String>) -> Self {
        self.ignore_globs.push(glob.into());
        self
    }

    // ── How ───────────────────────────────────────────────────────────────

    /// Keep only the best `n` matches (batch) or stop after `n` (streaming).
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Number of walker threads. Defaults to the logical CPU count; `0` is
    /// rejected when the search starts.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    /// Maximum traversal depth. `1` means the roots' children only.
    /// Unlimited by default.
    pub fn max_depth(mut self, d: usize) -> Self {
        self.max_depth = Some(d);
        self
    }

    /// Include dot-files and dot-directories. Off by default.
    pub fn hidden(mut self, yes: bool) -> Self {
        self.include_hidden = yes;
        self
    }

    /// Follow symbolic links into directories. On by default; cycles are
    /// detected and reported as warnings.
    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    /// Emit matches through a re-ordering window of `window` entries instead
    /// of sorting everything at the end. Affects [`stream()`](Self::stream).
    pub fn streaming(mut self, window: usize) -> Self {
        self.window = Some(window);
        self
    }

    /// Capacity of the worker → consumer channel. Producers block when it
    /// is full.
    pub fn channel_capacity(mut self, n: usize) -> Self {
        self.channel_capacity = n;
        self
    }

    /// Maximum branching fragment width in the shallow index.
    pub fn shallow_threshold(mut self, n: usize) -> Self {
        self.shallow_threshold = n;
        self
    }

    /// Share a cancel token with the caller, e.g. to stop from a signal
    /// handler or after a deadline.
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Compile the pattern and start walking. Matches come back in arrival
    /// order.
    ///
    /// # Errors
    ///
    /// Every fatal error is raised here, before any worker runs: a missing
    /// or malformed pattern, a zero thread count, a root that is not a
    /// directory, or a thread that cannot be spawned.
    pub fn walk(self) -> Result<Walk, FuError> {
        self.start().map(|(walk, _, _)| walk)
    }

    /// Walk and yield matches best-first through the configured window
    /// ([`DEFAULT_WINDOW`] unless [`streaming()`](Self::streaming) set one).
    /// With a limit, iteration ends after `n` matches; dropping the
    /// iterator cancels whatever is still being walked.
    ///
    /// Call [`Streaming::into_inner`] and [`Walk::finish`] afterwards to
    /// collect warnings and statistics.
    pub fn stream(self) -> Result<Streaming<Walk>, FuError> {
        let (walk, window, limit) = self.start()?;
        let stream = Streaming::new(walk, window.unwrap_or(DEFAULT_WINDOW));
        Ok(match limit {
            Some(n) => stream.limit(n),
            None => stream,
        })
    }

    /// Run to completion and return every match ranked, plus warnings and
    /// statistics.
    pub fn run(self) -> Result<SearchResults, FuError> {
        let (mut walk, _, limit) = self.start()?;
        let mut matches = aggregator::collect(walk.by_ref());
        let report = walk.finish();

        if let Some(n) = limit {
            matches.truncate(n);
        }
        let mut stats = report.stats;
        stats.matches = matches.len();

        Ok(SearchResults {
            matches,
            warnings: report.warnings,
            stats,
            cancelled: report.cancelled,
        })
    }

    fn start(self) -> Result<(Walk, Option<usize>, Option<usize>), FuError> {
        let raw = self
            .pattern
            .ok_or_else(|| FuError::invalid_pattern("", "no pattern provided"))?;
        if self.threads == 0 {
            return Err(FuError::InvalidThreadCount(0));
        }
        let pattern: Pattern = compile(
            &raw,
            &CompileOptions {
                mode:           self.mode,
                case_sensitive: self.case_sensitive,
                exact:          self.exact,
            },
        )?;

        let opts = WalkOptions {
            threads:           self.threads,
            max_depth:         self.max_depth,
            include_hidden:    self.include_hidden,
            follow_links:      self.follow_links,
            ignore_globs:      self.ignore_globs,
            channel_capacity:  self.channel_capacity,
            shallow_threshold: self.shallow_threshold,
            filters:           self.filters,
            invert_filters:    self.exclude,
            cancel:            self.cancel,
        };
        let walk = walk_with(&self.roots, Arc::new(pattern), opts)?;
        Ok((walk, self.window, self.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_pattern_is_rejected() {
        let err = crate::search().run().unwrap_err();
        assert!(matches!(err, FuError::InvalidPattern { .. }));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let err = crate::search().pattern("x").threads(0).run().unwrap_err();
        assert!(matches!(err, FuError::InvalidThreadCount(0)));
    }

    #[test]
    fn bad_pattern_fails_before_walking() {
        let err = crate::search()
            .root("/definitely/not/here")
            .pattern("[abc")
            .run()
            .unwrap_err();
        assert!(matches!(err, FuError::InvalidPattern { .. }));
    }

    #[test]
    fn limit_keeps_the_best() {
        let dir = TempDir::new().unwrap();
        for name in ["log", "a.log", "bb.log", "ccc.log"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let results = crate::search()
            .root(dir.path())
            .pattern("log")
            .exact_mode(ExactMode::Substring)
            .limit(2)
            .run()
            .unwrap();
        assert_eq!(results.matches.len(), 2);
        assert_eq!(results.stats.matches, 2);
        let names: Vec<_> = results.matches.iter().map(|m| m.entry.name.as_str()).collect();
        assert_eq!(names, ["log", "a.log"]);
    }

    #[test]
    fn stream_stops_at_limit() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }
        let token = CancelToken::new();
        let mut stream = crate::search()
            .root(dir.path())
            .pattern("*.txt")
            .streaming(4)
            .limit(3)
            .cancel_token(token.clone())
            .stream()
            .unwrap();
        assert_eq!(stream.by_ref().count(), 3);

        let report = stream.into_inner().finish();
        assert!(report.cancelled);
        assert!(token.is_cancelled());
    }
}
