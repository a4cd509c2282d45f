//! Parallel directory traversal.
//!
//! A fixed pool of worker threads shares directory subtrees through a
//! work-stealing deque: roots are seeded into a global injector (breadth
//! first at the top), each worker pushes the subdirectories it discovers
//! onto its own LIFO deque (depth first within a subtree), and idle workers
//! steal from the injector or from each other.
//!
//! Per directory a worker lists entries, records them in the
//! [`ShallowIndex`], scores them, applies filters and sends matches over a
//! bounded channel. The consumer side is [`Walk`], a plain iterator; a full
//! channel blocks producers instead of buffering without bound.
//!
//! Every directory is searched at most once. A followed symlink whose target
//! lies inside a search root is never entered, since the target is walked
//! under its real path. Links leading out of the roots are collected while
//! the roots are walked; once the pool runs dry, each distinct target is
//! entered through the link with the smallest path and the other links are
//! reported. This repeats until no new targets show up, so the result does
//! not depend on scheduling.

use std::collections::btree_map::{BTreeMap, Entry as Slot};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;
use crate::entry::{Entry, EntryKind};
use crate::error::{FuError, TraversalWarning};
use crate::filters::EntryFilter;
use crate::index::{NodeId, ShallowIndex};
use crate::matcher;
use crate::pattern::{Pattern, SEPARATOR};
use crate::results::{Match, ScanStats};

const MAX_IDLE_SPINS: u32 = 64;
/// Upper bound on a parked worker's wait, so an external cancel is noticed
/// without a wakeup.
const PARK_TIMEOUT: Duration = Duration::from_millis(5);
/// How long a blocked send waits before re-checking for cancellation.
const SEND_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Traversal parameters. Usually filled in by
/// [`SearchBuilder`](crate::SearchBuilder).
pub struct WalkOptions {
    pub threads:           usize,
    /// `0` lists nothing, `1` lists the roots' direct children, and so on.
    pub max_depth:         Option<usize>,
    pub include_hidden:    bool,
    pub follow_links:      bool,
    /// Gitignore-syntax globs, evaluated relative to each root.
    pub ignore_globs:      Vec<String>,
    pub channel_capacity:  usize,
    pub shallow_threshold: usize,
    pub filters:           Vec<Box<dyn EntryFilter>>,
    /// Emit scored entries that fail the filter stack instead of those
    /// that pass it. With no filters nothing is emitted.
    pub invert_filters:    bool,
    /// Dropping or abandoning an unfinished [`Walk`] cancels this token.
    pub cancel:            CancelToken,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            threads:           default_threads(),
            max_depth:         None,
            include_hidden:    false,
            follow_links:      true,
            ignore_globs:      Vec::new(),
            channel_capacity:  1024,
            shallow_threshold: ShallowIndex::DEFAULT_THRESHOLD,
            filters:           Vec::new(),
            invert_filters:    false,
            cancel:            CancelToken::new(),
        }
    }
}

/// Logical CPU count, with a safe fallback.
pub(crate) fn default_threads() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Walk `root` with `concurrency` workers and default options.
///
/// # Errors
///
/// [`FuError::InvalidThreadCount`] for zero workers,
/// [`FuError::RootNotFound`] when `root` is not a readable directory path,
/// [`FuError::ThreadPool`] when a worker cannot be spawned.
pub fn walk(root: impl AsRef<Path>, pattern: Pattern, concurrency: usize) -> Result<Walk, FuError> {
    walk_with(
        &[root.as_ref().to_path_buf()],
        Arc::new(pattern),
        WalkOptions {
            threads: concurrency,
            ..WalkOptions::default()
        },
    )
}

/// Walk several roots at once. Roots nested inside another root (or given
/// twice) are searched only once.
pub fn walk_with(roots: &[PathBuf], pattern: Arc<Pattern>, opts: WalkOptions) -> Result<Walk, FuError> {
    if opts.threads == 0 {
        return Err(FuError::InvalidThreadCount(0));
    }
    let started = Instant::now();

    let roots = if roots.is_empty() {
        resolve_roots(&[PathBuf::from(".")])?
    } else {
        resolve_roots(roots)?
    };
    let mut scopes = Vec::with_capacity(roots.len());
    for root in roots {
        let ignore = build_ignore(&root, &opts.ignore_globs)?;
        scopes.push(RootScope { path: root, ignore });
    }

    let locals: Vec<Worker<DirTask>> = (0..opts.threads).map(|_| Worker::new_lifo()).collect();
    let stealers = locals.iter().map(Worker::stealer).collect();

    let covered = ShallowIndex::new(1, ShallowIndex::DEFAULT_THRESHOLD);
    for scope in &scopes {
        covered.insert(&path_segments(&scope.path));
    }

    let shared = Arc::new(Shared {
        pattern,
        index: ShallowIndex::new(opts.threads, opts.shallow_threshold),
        injector: Injector::new(),
        stealers,
        pending: AtomicUsize::new(0),
        roots: scopes,
        covered,
        deferred: Mutex::new(BTreeMap::new()),
        max_depth: opts.max_depth,
        include_hidden: opts.include_hidden,
        follow_links: opts.follow_links,
        filters: opts.filters,
        invert_filters: opts.invert_filters,
        cancel: opts.cancel,
        idle: Mutex::new(()),
        wakeup: Condvar::new(),
        sleepers: AtomicUsize::new(0),
        warnings: Mutex::new(Vec::new()),
        files: AtomicUsize::new(0),
        dirs: AtomicUsize::new(0),
        other: AtomicUsize::new(0),
    });

    if shared.max_depth != Some(0) {
        for (i, scope) in shared.roots.iter().enumerate() {
            let node = if i == 0 {
                shared.index.root()
            } else {
                shared.index.new_anchor()
            };
            shared.pending.fetch_add(1, Ordering::SeqCst);
            shared.injector.push(DirTask {
                path: scope.path.clone(),
                rel: String::new(),
                node,
                depth: 0,
                root: i,
                external: false,
                ancestry: Arc::new(Ancestry {
                    dir:    scope.path.clone(),
                    parent: None,
                }),
            });
        }
    }

    debug!(
        roots = shared.roots.len(),
        threads = locals.len(),
        anchored = shared.pattern.is_anchored(),
        "walk started"
    );

    let (tx, rx) = bounded(opts.channel_capacity.max(1));
    let mut handles = Vec::with_capacity(locals.len());
    for (id, local) in locals.into_iter().enumerate() {
        let shared_w = Arc::clone(&shared);
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("fu-walker-{id}"))
            .spawn(move || worker_loop(id, local, &shared_w, &tx));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                shared.cancel.cancel();
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(FuError::ThreadPool(e.to_string()));
            }
        }
    }
    drop(tx);

    Ok(Walk {
        rx: Some(rx),
        handles,
        shared,
        started,
        delivered: 0,
        exhausted: false,
    })
}

/// Canonicalize, validate and de-nest the search roots.
///
/// Shorter paths are inserted first, so a root whose ancestor is already in
/// the index is covered and dropped.
fn resolve_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>, FuError> {
    let mut canonical = Vec::with_capacity(roots.len());
    for root in roots {
        let path = fs::canonicalize(root).map_err(|_| FuError::RootNotFound(root.clone()))?;
        if !path.is_dir() {
            return Err(FuError::RootNotFound(root.clone()));
        }
        canonical.push(path);
    }

    canonical.sort_by(|a, b| {
        let (sa, sb) = (a.components().count(), b.components().count());
        sa.cmp(&sb).then_with(|| a.cmp(b))
    });

    let index = ShallowIndex::new(1, ShallowIndex::DEFAULT_THRESHOLD);
    let mut kept = Vec::with_capacity(canonical.len());
    for path in canonical {
        let segs = path_segments(&path);
        if index.covers(&segs) {
            debug!(root = %path.display(), "root already covered, skipping");
            continue;
        }
        index.insert(&segs);
        kept.push(path);
    }
    kept.sort();
    Ok(kept)
}

fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect()
}

fn build_ignore(root: &Path, globs: &[String]) -> Result<Gitignore, FuError> {
    if globs.is_empty() {
        return Ok(Gitignore::empty());
    }
    let mut builder = GitignoreBuilder::new(root);
    for glob in globs {
        builder
            .add_line(None, glob)
            .map_err(|e| FuError::invalid_pattern(glob.as_str(), e.to_string()))?;
    }
    builder
        .build()
        .map_err(|e| FuError::invalid_pattern(globs.join(","), e.to_string()))
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct RootScope {
    path:   PathBuf,
    ignore: Gitignore,
}

/// Canonical directories from a root down to the current directory.
struct Ancestry {
    dir:    PathBuf,
    parent: Option<Arc<Ancestry>>,
}

impl Ancestry {
    fn contains(&self, dir: &Path) -> bool {
        let mut cursor = Some(self);
        while let Some(a) = cursor {
            if a.dir == dir {
                return true;
            }
            cursor = a.parent.as_deref();
        }
        false
    }
}

/// One unit of work: a directory to list.
struct DirTask {
    path:     PathBuf,
    /// Path relative to its root, `/`-separated.
    rel:      String,
    node:     NodeId,
    depth:    usize,
    root:     usize,
    /// Reached through a symlink leading out of every search root.
    external: bool,
    ancestry: Arc<Ancestry>,
}

struct Shared {
    pattern:        Arc<Pattern>,
    index:          ShallowIndex,
    injector:       Injector<DirTask>,
    stealers:       Vec<Stealer<DirTask>>,
    /// Tasks pushed but not finished. Zero means the walk is complete.
    pending:        AtomicUsize,
    roots:          Vec<RootScope>,
    /// Trees already searched or scheduled: the roots, plus every external
    /// symlink target entered so far.
    covered:        ShallowIndex,
    /// External symlink targets waiting for the pool to run dry, keyed by
    /// canonical target, holding the winning link's task.
    deferred:       Mutex<BTreeMap<PathBuf, DirTask>>,
    max_depth:      Option<usize>,
    include_hidden: bool,
    follow_links:   bool,
    filters:        Vec<Box<dyn EntryFilter>>,
    invert_filters: bool,
    cancel:         CancelToken,
    idle:           Mutex<()>,
    wakeup:         Condvar,
    sleepers:       AtomicUsize,
    warnings:       Mutex<Vec<TraversalWarning>>,
    files:          AtomicUsize,
    dirs:           AtomicUsize,
    other:          AtomicUsize,
}

impl Shared {
    fn warn(&self, warning: TraversalWarning) {
        debug!(path = %warning.path().display(), "{warning}");
        self.warnings.lock().push(warning);
    }

    fn count(&self, kind: EntryKind) {
        let counter = match kind {
            EntryKind::File => &self.files,
            EntryKind::Dir => &self.dirs,
            EntryKind::Symlink | EntryKind::Other => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn has_work(&self) -> bool {
        !self.injector.is_empty() || self.stealers.iter().any(|s| !s.is_empty())
    }

    /// Block until new work may be available. Sleepers register under the
    /// lock before re-checking, so a push followed by [`wake_one`] cannot
    /// slip between the check and the wait.
    ///
    /// [`wake_one`]: Self::wake_one
    fn park(&self) {
        let mut guard = self.idle.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        if !self.has_work()
            && self.pending.load(Ordering::SeqCst) != 0
            && !self.cancel.is_cancelled()
        {
            self.wakeup.wait_for(&mut guard, PARK_TIMEOUT);
        }
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }

    fn wake_one(&self) {
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.idle.lock();
            self.wakeup.notify_one();
        }
    }

    fn wake_all(&self) {
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.idle.lock();
            self.wakeup.notify_all();
        }
    }

    /// Hold an external symlink target until the pool runs dry. Of several
    /// links to one target, the smallest link path wins.
    fn defer(&self, target: PathBuf, task: DirTask) {
        let mut deferred = self.deferred.lock();
        let loser = match deferred.entry(target.clone()) {
            Slot::Vacant(slot) => {
                slot.insert(task);
                return;
            }
            Slot::Occupied(mut slot) => {
                if task.path < slot.get().path {
                    slot.insert(task)
                } else {
                    task
                }
            }
        };
        drop(deferred);
        self.warn(TraversalWarning::AlreadySearched {
            link: loser.path,
            target,
        });
    }

    /// Called once no task is pending. Schedules the deferred external
    /// targets in path order, skipping any that an earlier one covers.
    /// Returns `false` when the walk is complete.
    fn flush_deferred(&self) -> bool {
        let mut deferred = self.deferred.lock();
        if self.pending.load(Ordering::SeqCst) != 0 {
            return true;
        }
        if deferred.is_empty() || self.cancel.is_cancelled() {
            return false;
        }

        for (target, task) in std::mem::take(&mut *deferred) {
            let segs = path_segments(&target);
            if self.covered.covers(&segs) {
                self.warn(TraversalWarning::AlreadySearched {
                    link: task.path,
                    target,
                });
                continue;
            }
            self.covered.insert(&segs);
            debug!(link = %task.path.display(), target = %target.display(), "entering external target");
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.injector.push(task);
        }
        let more = self.pending.load(Ordering::SeqCst) != 0;
        drop(deferred);
        self.wake_all();
        more
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

fn worker_loop(id: usize, local: Worker<DirTask>, shared: &Shared, tx: &Sender<Match>) {
    trace!(worker = id, "worker started");
    let mut idle_spins = 0;

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        let Some(task) = find_task(id, &local, shared) else {
            if shared.pending.load(Ordering::SeqCst) == 0 {
                if shared.flush_deferred() {
                    continue;
                }
                break;
            }
            idle_spins += 1;
            if idle_spins > MAX_IDLE_SPINS {
                shared.park();
                idle_spins = 0;
            } else {
                std::hint::spin_loop();
            }
            continue;
        };
        idle_spins = 0;

        scan_dir(id, &task, &local, shared, tx);
        if shared.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            shared.wake_all();
        }
    }
    shared.wake_all();
    trace!(worker = id, "worker finished");
}

fn find_task(id: usize, local: &Worker<DirTask>, shared: &Shared) -> Option<DirTask> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        match shared.injector.steal_batch_and_pop(local) {
            Steal::Success(task) => return Some(task),
            Steal::Empty => break,
            Steal::Retry => continue,
        }
    }
    for (i, stealer) in shared.stealers.iter().enumerate() {
        if i == id {
            continue;
        }
        loop {
            match stealer.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
    }
    None
}

/// List one directory. Subdirectories worth visiting go onto `local`.
fn scan_dir(id: usize, task: &DirTask, local: &Worker<DirTask>, shared: &Shared, tx: &Sender<Match>) {
    trace!(worker = id, dir = %task.path.display(), "claimed");

    let listing = match fs::read_dir(&task.path) {
        Ok(listing) => listing,
        Err(e) => {
            shared.warn(TraversalWarning::from_io(task.path.clone(), e));
            return;
        }
    };
    let scope = &shared.roots[task.root];
    let depth = task.depth + 1;

    for item in listing {
        if shared.cancel.is_cancelled() {
            return;
        }
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                shared.warn(TraversalWarning::from_io(task.path.clone(), e));
                continue;
            }
        };

        let file_name = item.file_name();
        let name = file_name.to_string_lossy().into_owned();
        if !shared.include_hidden && name.starts_with('.') {
            continue;
        }
        let path = item.path();
        let kind = match item.file_type() {
            Ok(ft) => EntryKind::from_file_type(ft),
            Err(e) => {
                shared.warn(TraversalWarning::from_io(path, e));
                continue;
            }
        };

        // Symlinks are resolved once, here.
        let target = if kind == EntryKind::Symlink && shared.follow_links {
            match fs::metadata(&path) {
                Ok(meta) => Some(meta),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    shared.warn(TraversalWarning::BrokenSymlink(path.clone()));
                    None
                }
                Err(e) => {
                    shared.warn(TraversalWarning::from_io(path.clone(), e));
                    None
                }
            }
        } else {
            None
        };
        let is_dir = kind == EntryKind::Dir || target.as_ref().is_some_and(|m| m.is_dir());

        if scope.ignore.matched(&path, is_dir).is_ignore() {
            continue;
        }
        shared.count(kind);

        let rel = if task.rel.is_empty() {
            name.clone()
        } else {
            format!("{}{SEPARATOR}{name}", task.rel)
        };
        let node = shared.index.insert_child(id, task.node, &name);

        let pattern = &shared.pattern;
        if let Some(score) = matcher::score(pattern, pattern.subject(&name, &rel)) {
            let mut entry = Entry {
                path: path.clone(),
                name,
                kind,
                depth,
                metadata: target,
            };
            let passed = shared.filters.iter().all(|f| f.accepts(&mut entry));
            if passed != shared.invert_filters && !send(tx, Match { entry, score }, shared) {
                return;
            }
        }

        if !is_dir || shared.max_depth.is_some_and(|max| depth >= max) {
            continue;
        }
        if !shared.index.should_descend(node, pattern) {
            continue;
        }

        if kind == EntryKind::Dir {
            let canonical = task.ancestry.dir.join(&file_name);
            // an external target entered earlier through its own link
            if task.external && is_entry_point(&shared.covered, &canonical) {
                debug!(dir = %path.display(), "already searched, skipping");
                continue;
            }
            shared.pending.fetch_add(1, Ordering::SeqCst);
            local.push(DirTask {
                path,
                rel,
                node,
                depth,
                root: task.root,
                external: task.external,
                ancestry: Arc::new(Ancestry {
                    dir:    canonical,
                    parent: Some(Arc::clone(&task.ancestry)),
                }),
            });
            shared.wake_one();
            continue;
        }

        let canonical = match fs::canonicalize(&path) {
            Ok(dir) => dir,
            Err(e) => {
                shared.warn(TraversalWarning::from_io(path, e));
                continue;
            }
        };
        if task.ancestry.contains(&canonical) {
            shared.warn(TraversalWarning::SymlinkLoop {
                link:   path,
                target: canonical,
            });
            continue;
        }
        if shared.covered.covers(&path_segments(&canonical)) {
            shared.warn(TraversalWarning::AlreadySearched {
                link:   path,
                target: canonical,
            });
            continue;
        }

        let ancestry = Arc::new(Ancestry {
            dir:    canonical.clone(),
            parent: Some(Arc::clone(&task.ancestry)),
        });
        shared.defer(
            canonical,
            DirTask {
                path,
                rel,
                node,
                depth,
                root: task.root,
                external: true,
                ancestry,
            },
        );
    }
}

/// Whether `dir` itself was recorded as a searched tree.
fn is_entry_point(covered: &ShallowIndex, dir: &Path) -> bool {
    covered
        .find(&path_segments(dir))
        .is_some_and(|node| covered.is_terminal(node))
}

/// Blocking send that gives up once the walk is cancelled. A vanished
/// consumer cancels the walk.
fn send(tx: &Sender<Match>, mut m: Match, shared: &Shared) -> bool {
    loop {
        match tx.send_timeout(m, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if shared.cancel.is_cancelled() {
                    return false;
                }
                m = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                shared.cancel.cancel();
                return false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

/// A running traversal, consumed as an iterator of matches in arrival
/// order. Single pass; not restartable.
///
/// Dropping a `Walk` before it is exhausted cancels it and joins the
/// workers.
pub struct Walk {
    rx:        Option<Receiver<Match>>,
    handles:   Vec<JoinHandle<()>>,
    shared:    Arc<Shared>,
    started:   Instant,
    delivered: usize,
    exhausted: bool,
}

/// What is left once a walk has ended.
#[derive(Debug)]
pub struct WalkReport {
    /// Sorted by path.
    pub warnings:  Vec<TraversalWarning>,
    pub stats:     ScanStats,
    pub cancelled: bool,
}

impl Walk {
    /// A handle that stops this walk from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Stop claiming new directories. Matches already queued are still
    /// yielded.
    pub fn cancel(&self) {
        self.shared.cancel.cancel();
        self.shared.wake_all();
    }

    /// End the walk and collect warnings and statistics. Cancels first
    /// unless the iterator was drained.
    pub fn finish(mut self) -> WalkReport {
        if !self.exhausted {
            self.cancel();
        }
        self.join_workers();

        let mut warnings = std::mem::take(&mut *self.shared.warnings.lock());
        warnings.sort_by(|a, b| {
            a.path()
                .cmp(b.path())
                .then_with(|| a.to_string().cmp(&b.to_string()))
        });

        let s = &self.shared;
        let stats = ScanStats::compute(
            s.files.load(Ordering::Relaxed),
            s.dirs.load(Ordering::Relaxed),
            s.other.load(Ordering::Relaxed),
            self.delivered,
            self.started.elapsed(),
        );
        let cancelled = s.cancel.is_cancelled();
        debug!(
            entries = stats.entries(),
            matches = stats.matches,
            warnings = warnings.len(),
            cancelled,
            "walk finished"
        );
        WalkReport {
            warnings,
            stats,
            cancelled,
        }
    }

    fn join_workers(&mut self) {
        self.rx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("walker thread panicked");
            }
        }
    }
}

impl Iterator for Walk {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        match self.rx.as_ref()?.recv() {
            Ok(m) => {
                self.delivered += 1;
                Some(m)
            }
            Err(_) => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl Drop for Walk {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.cancel();
            self.join_workers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn tree(paths: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for p in paths {
            let full = dir.path().join(p);
            if p.ends_with('/') {
                fs::create_dir_all(&full).unwrap();
            } else {
                fs::create_dir_all(full.parent().unwrap()).unwrap();
                fs::write(&full, "").unwrap();
            }
        }
        dir
    }

    fn names(walk: Walk) -> BTreeSet<String> {
        walk.map(|m| m.entry.name).collect()
    }

    #[test]
    fn zero_workers_is_rejected() {
        let dir = tree(&["a.txt"]);
        let err = walk(dir.path(), "a.txt".parse().unwrap(), 0).err().unwrap();
        assert!(matches!(err, FuError::InvalidThreadCount(0)));
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = tree(&[]);
        let err = walk(dir.path().join("nope"), "x".parse().unwrap(), 2).err().unwrap();
        assert!(matches!(err, FuError::RootNotFound(_)));
    }

    #[test]
    fn file_root_is_fatal() {
        let dir = tree(&["f.txt"]);
        let err = walk(dir.path().join("f.txt"), "x".parse().unwrap(), 2).err().unwrap();
        assert!(matches!(err, FuError::RootNotFound(_)));
    }

    #[test]
    fn finds_nested_matches_and_never_the_root() {
        let dir = tree(&["a/foo.txt", "a/bar/foo.txt", "b/zzfoo.log", "foo.txt/"]);
        let found: Vec<_> = walk(dir.path(), "foo.txt".parse().unwrap(), 3)
            .unwrap()
            .map(|m| m.entry)
            .collect();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|e| e.path.is_absolute()));
        assert!(found.iter().any(|e| e.kind == EntryKind::Dir && e.depth == 1));
        assert!(found.iter().any(|e| e.depth == 3));
    }

    #[test]
    fn hidden_entries_are_skipped_at_listing_time() {
        let dir = tree(&[".git/config", ".env", "config"]);
        let all = Arc::new("*".parse::<Pattern>().unwrap());

        let visible = walk_with(&[dir.path().into()], Arc::clone(&all), WalkOptions::default()).unwrap();
        assert_eq!(names(visible), BTreeSet::from(["config".to_owned()]));

        let opts = WalkOptions {
            include_hidden: true,
            ..WalkOptions::default()
        };
        let everything = walk_with(&[dir.path().into()], all, opts).unwrap();
        assert_eq!(everything.count(), 4);
    }

    #[test]
    fn depth_limit_stops_recursion() {
        let dir = tree(&["x.rs", "a/x.rs", "a/b/x.rs"]);
        let pattern = Arc::new("x.rs".parse::<Pattern>().unwrap());
        let count = |max_depth| {
            let opts = WalkOptions {
                max_depth,
                ..WalkOptions::default()
            };
            walk_with(&[dir.path().into()], Arc::clone(&pattern), opts)
                .unwrap()
                .count()
        };
        assert_eq!(count(Some(0)), 0);
        assert_eq!(count(Some(1)), 1);
        assert_eq!(count(Some(2)), 2);
        assert_eq!(count(None), 3);
    }

    #[test]
    fn ignore_globs_skip_entries_and_subtrees() {
        let dir = tree(&["target/debug/main.rs", "src/main.rs", "notes.bak"]);
        let opts = WalkOptions {
            ignore_globs: vec!["target/".into(), "*.bak".into()],
            ..WalkOptions::default()
        };
        let w = walk_with(&[dir.path().into()], Arc::new("*".parse().unwrap()), opts).unwrap();
        let found = names(w);
        assert!(found.contains("src"));
        assert!(found.contains("main.rs"));
        assert!(!found.contains("target"));
        assert!(!found.contains("debug"));
        assert!(!found.contains("notes.bak"));
    }

    #[test]
    fn bad_ignore_glob_is_an_invalid_pattern() {
        let dir = tree(&[]);
        let opts = WalkOptions {
            ignore_globs: vec!["[".into()],
            ..WalkOptions::default()
        };
        let err = walk_with(&[dir.path().into()], Arc::new("x".parse().unwrap()), opts)
            .err()
            .unwrap();
        assert!(matches!(err, FuError::InvalidPattern { .. }));
    }

    #[test]
    fn nested_and_duplicate_roots_collapse() {
        let dir = tree(&["a/b/hit", "c/hit"]);
        let root = dir.path().to_path_buf();
        let roots = [root.join("a/b"), root.join("a"), root.join("a"), root.join("c")];
        let w = walk_with(&roots, Arc::new("hit".parse().unwrap()), WalkOptions::default()).unwrap();
        assert_eq!(w.count(), 2);

        let kept = resolve_roots(&roots).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn stats_and_report() {
        let dir = tree(&["a/one.txt", "a/two.txt", "b/"]);
        let mut w = walk(dir.path(), "*.txt".parse().unwrap(), 2).unwrap();
        assert_eq!(w.by_ref().count(), 2);
        let report = w.finish();
        assert!(!report.cancelled);
        assert!(report.warnings.is_empty());
        assert_eq!(report.stats.files, 2);
        assert_eq!(report.stats.dirs, 2);
        assert_eq!(report.stats.matches, 2);
    }

    #[test]
    fn early_finish_cancels() {
        let mut paths = Vec::new();
        for i in 0..40 {
            paths.push(format!("d{i}/f{i}.txt"));
        }
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        let dir = tree(&refs);

        let opts = WalkOptions {
            threads: 2,
            channel_capacity: 1,
            ..WalkOptions::default()
        };
        let mut w = walk_with(&[dir.path().into()], Arc::new("*.txt".parse().unwrap()), opts).unwrap();
        assert!(w.next().is_some());
        let report = w.finish();
        assert!(report.cancelled);
        assert!(report.stats.matches < 40);
    }

    #[test]
    fn dropping_a_walk_stops_workers() {
        let dir = tree(&["a/x", "b/x", "c/x"]);
        let token = {
            let mut w = walk(dir.path(), "x".parse().unwrap(), 2).unwrap();
            let token = w.cancel_token();
            w.next();
            token
        };
        assert!(token.is_cancelled());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_to_ancestor_warns_once() {
        let dir = tree(&["a/foo.txt"]);
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("a/loop")).unwrap();

        let mut w = walk(dir.path(), "foo.txt".parse().unwrap(), 4).unwrap();
        assert_eq!(w.by_ref().count(), 1);
        let report = w.finish();
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            &report.warnings[0],
            TraversalWarning::SymlinkLoop { link, .. } if link.ends_with("a/loop")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn broken_symlink_is_a_warning_and_still_listed() {
        let dir = tree(&[]);
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("dangling")).unwrap();

        let mut w = walk(dir.path(), "dangling".parse().unwrap(), 1).unwrap();
        let found: Vec<_> = w.by_ref().collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].entry.kind, EntryKind::Symlink);
        let report = w.finish();
        assert!(matches!(report.warnings[..], [TraversalWarning::BrokenSymlink(_)]));
    }

    #[cfg(unix)]
    #[test]
    fn links_inside_the_root_are_never_entered() {
        let dir = tree(&["real/inner.txt"]);
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let opts = WalkOptions {
            follow_links: false,
            ..WalkOptions::default()
        };
        let mut w = walk_with(&[dir.path().into()], Arc::new("inner.txt".parse().unwrap()), opts).unwrap();
        assert_eq!(w.by_ref().count(), 1);
        assert!(w.finish().warnings.is_empty());

        let mut w = walk(dir.path(), "inner.txt".parse().unwrap(), 2).unwrap();
        let found: Vec<_> = w.by_ref().map(|m| m.entry.path).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("real/inner.txt"));
        let report = w.finish();
        assert!(matches!(
            &report.warnings[..],
            [TraversalWarning::AlreadySearched { link, .. }] if link.ends_with("link")
        ));
    }

    /// Collect match paths relative to `base` and warnings as
    /// `kind:link` strings relative to `base`.
    #[cfg(unix)]
    fn outcome(root: &Path, base: &Path, threads: usize) -> (Vec<String>, Vec<String>) {
        let base = fs::canonicalize(base).unwrap();
        let opts = WalkOptions {
            threads,
            ..WalkOptions::default()
        };
        let mut w = walk_with(&[root.into()], Arc::new("hit.txt".parse().unwrap()), opts).unwrap();
        let mut hits: Vec<String> = w
            .by_ref()
            .map(|m| m.entry.path.strip_prefix(&base).unwrap().display().to_string())
            .collect();
        hits.sort();
        let warnings = w
            .finish()
            .warnings
            .iter()
            .map(|warning| {
                let kind = match warning {
                    TraversalWarning::SymlinkLoop { .. } => "loop",
                    TraversalWarning::AlreadySearched { .. } => "seen",
                    _ => "other",
                };
                let link = warning.path().strip_prefix(&base).unwrap().display().to_string();
                format!("{kind}:{link}")
            })
            .collect();
        (hits, warnings)
    }

    #[cfg(unix)]
    #[test]
    fn external_target_is_entered_once_through_the_smallest_link() {
        use std::os::unix::fs::symlink;

        let base = tree(&["root/", "out/hit.txt", "out/sub/"]);
        let root = base.path().join("root");
        let out = base.path().join("out");
        symlink(&out, root.join("l2")).unwrap();
        symlink(&out, root.join("l1")).unwrap();
        symlink(&out, out.join("sub/back")).unwrap();

        for threads in [1, 4] {
            let (hits, warnings) = outcome(&root, base.path(), threads);
            assert_eq!(hits, ["root/l1/hit.txt"], "threads {threads}");
            assert_eq!(warnings, ["loop:root/l1/sub/back", "seen:root/l2"], "threads {threads}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn nested_external_targets_are_searched_once() {
        use std::os::unix::fs::symlink;

        let base = tree(&["root/", "one/", "two/sub/hit.txt"]);
        let root = base.path().join("root");
        let two = base.path().join("two");
        // root/a -> one, one/down -> two/sub, two/sub/up -> two
        symlink(base.path().join("one"), root.join("a")).unwrap();
        symlink(two.join("sub"), base.path().join("one/down")).unwrap();
        symlink(&two, two.join("sub/up")).unwrap();

        for threads in [1, 3] {
            let (hits, warnings) = outcome(&root, base.path(), threads);
            assert_eq!(hits, ["root/a/down/hit.txt"], "threads {threads}");
            assert!(warnings.is_empty(), "{warnings:?}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn wider_external_target_wins_over_a_nested_one() {
        use std::os::unix::fs::symlink;

        let base = tree(&["root/", "out/sub/hit.txt"]);
        let root = base.path().join("root");
        let out = base.path().join("out");
        symlink(out.join("sub"), root.join("a")).unwrap();
        symlink(&out, root.join("b")).unwrap();

        let (hits, warnings) = outcome(&root, base.path(), 2);
        assert_eq!(hits, ["root/b/sub/hit.txt"]);
        assert_eq!(warnings, ["seen:root/a"]);
    }

    #[test]
    fn inverted_filters_keep_rejected_matches() {
        let dir = tree(&["logs/", "logs.txt"]);
        let opts = |invert_filters| WalkOptions {
            filters: vec![Box::new(crate::filters::KindFilter::dirs())],
            invert_filters,
            ..WalkOptions::default()
        };
        let pattern = Arc::new("logs*".parse::<Pattern>().unwrap());

        let kept = walk_with(&[dir.path().into()], Arc::clone(&pattern), opts(false)).unwrap();
        assert_eq!(names(kept), BTreeSet::from(["logs".to_owned()]));
        let inverted = walk_with(&[dir.path().into()], pattern, opts(true)).unwrap();
        assert_eq!(names(inverted), BTreeSet::from(["logs.txt".to_owned()]));
    }

    #[test]
    fn idle_workers_finish_on_a_single_directory() {
        let dir = tree(&["only.txt"]);
        let mut w = walk(dir.path(), "only.txt".parse().unwrap(), 8).unwrap();
        assert_eq!(w.by_ref().count(), 1);
        assert!(!w.finish().cancelled);
    }
}
