use std::io::{self, BufWriter, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use fu::filters::{AgeFilter, KindFilter};
use fu::{EntryKind, ExactMode, Match, MatchMode, ScanStats, SearchBuilder, SearchStatus, TraversalWarning};

#[derive(Parser, Debug)]
#[command(group = clap::ArgGroup::new("filters").multiple(true))]
#[command(
    name = "fu",
    version,
    about = "Find files by exact, glob, fuzzy or regex name patterns",
    after_help = "Exit status: 0 on success, 1 on a fatal error, 2 on a usage error, \
                  3 when the search completed with warnings."
)]
struct Cli {
    /// Pattern to match. Containing `/`, it matches the path relative to
    /// the search root instead of the name.
    pattern: String,

    /// Directories to search (default: current directory)
    paths: Vec<PathBuf>,

    /// Fuzzy (subsequence) matching
    #[arg(short = 'f', long, group = "mode")]
    fuzzy: bool,

    /// Treat the pattern as a glob even without metacharacters
    #[arg(short = 'g', long, group = "mode")]
    glob: bool,

    /// Treat glob metacharacters literally
    #[arg(short = 'x', long, group = "mode")]
    exact: bool,

    /// Regular expression
    #[arg(short = 'r', long = "regexp", group = "mode")]
    regex: bool,

    /// Match names ending with the pattern
    #[arg(short = 'a', long, group = "mode")]
    suffix: bool,

    /// Match names starting with the pattern
    #[arg(short = 'b', long, group = "mode")]
    prefix: bool,

    /// Exact patterns may match anywhere inside the name
    #[arg(short = 's', long)]
    substring: bool,

    /// Case-insensitive matching
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Only directories (same as --type dir)
    #[arg(short = 'd', long, group = "filters")]
    dirs: bool,

    /// Only entries of these kinds
    #[arg(short = 't', long = "type", value_enum, group = "filters")]
    kinds: Vec<KindArg>,

    /// Only entries sharing a permission bit with this octal mask
    #[arg(short = 'm', long, value_parser = parse_octal, group = "filters")]
    perm: Option<u32>,

    /// Only entries modified longer ago than this (e.g. 2d, 1h30m)
    #[arg(short = 'o', long, value_parser = humantime::parse_duration, group = "filters")]
    older: Option<Duration>,

    /// Only entries modified more recently than this
    #[arg(short = 'y', long, value_parser = humantime::parse_duration, group = "filters")]
    younger: Option<Duration>,

    /// Invert the filters: print matching names that fail them
    #[arg(short = 'e', long, requires = "filters")]
    exclude: bool,

    /// Include hidden entries
    #[arg(short = 'H', long)]
    hidden: bool,

    /// Do not follow symbolic links
    #[arg(long)]
    no_follow: bool,

    /// Maximum depth below each root
    #[arg(long)]
    max_depth: Option<usize>,

    /// Number of walker threads (default: logical CPUs)
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Walk with a single thread
    #[arg(long, conflicts_with = "threads")]
    seq: bool,

    /// Skip entries matching a gitignore-style glob (repeatable)
    #[arg(short = 'E', long = "ignore")]
    ignore: Vec<String>,

    /// Print matches as they are found, best-first within a window
    #[arg(long)]
    stream: bool,

    /// Re-ordering window for --stream
    #[arg(long, requires = "stream")]
    window: Option<usize>,

    /// Print at most this many matches
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Prefix each match with its score
    #[arg(long)]
    show_score: bool,

    /// Print traversal statistics to stderr
    #[arg(long)]
    stats: bool,

    /// More logging (-v debug, -vv trace); FU_LOG overrides
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    #[value(alias = "f")]
    File,
    #[value(alias = "d")]
    Dir,
    #[value(alias = "l")]
    Symlink,
    Other,
}

impl From<KindArg> for EntryKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::File => EntryKind::File,
            KindArg::Dir => EntryKind::Dir,
            KindArg::Symlink => EntryKind::Symlink,
            KindArg::Other => EntryKind::Other,
        }
    }
}

impl Cli {
    fn mode(&self) -> MatchMode {
        if self.fuzzy {
            MatchMode::Fuzzy
        } else if self.glob {
            MatchMode::Glob
        } else if self.exact {
            MatchMode::Exact
        } else if self.regex {
            MatchMode::Regex
        } else if self.suffix {
            MatchMode::Suffix
        } else if self.prefix {
            MatchMode::Prefix
        } else {
            MatchMode::Auto
        }
    }

    fn builder(&self) -> SearchBuilder {
        let mut search = fu::search()
            .roots(self.paths.iter().cloned())
            .pattern(self.pattern.as_str())
            .mode(self.mode())
            .case_sensitive(!self.ignore_case)
            .exact_mode(if self.substring {
                ExactMode::Substring
            } else {
                ExactMode::Full
            })
            .hidden(self.hidden)
            .follow_links(!self.no_follow)
            .exclude(self.exclude);

        if self.seq {
            search = search.threads(1);
        } else if let Some(n) = self.threads {
            search = search.threads(n.get());
        }
        if let Some(depth) = self.max_depth {
            search = search.max_depth(depth);
        }
        if let Some(n) = self.limit {
            search = search.limit(n);
        }
        for glob in &self.ignore {
            search = search.ignore(glob.as_str());
        }

        let mut kinds: Vec<EntryKind> = self.kinds.iter().map(|&k| k.into()).collect();
        if self.dirs {
            kinds.push(EntryKind::Dir);
        }
        if !kinds.is_empty() {
            search = search.filter(KindFilter::new(kinds));
        }
        if self.older.is_some() || self.younger.is_some() {
            search = search.filter(AgeFilter::new(self.older, self.younger));
        }
        search = self.perm_filter(search);
        search
    }

    #[cfg(unix)]
    fn perm_filter(&self, search: SearchBuilder) -> SearchBuilder {
        match self.perm {
            Some(mask) => search.filter(fu::filters::PermFilter::new(mask)),
            None => search,
        }
    }

    #[cfg(not(unix))]
    fn perm_filter(&self, search: SearchBuilder) -> SearchBuilder {
        if self.perm.is_some() {
            tracing::warn!("--perm is only supported on unix, ignoring");
        }
        search
    }
}

fn parse_octal(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8).map_err(|e| format!("not an octal mask: {e}"))
}

/// Distinct from clap's usage-error status 2.
const WARNINGS_EXIT: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    colored::control::set_override(io::stderr().is_terminal());

    match run(&cli) {
        Ok(SearchStatus::Success) => ExitCode::SUCCESS,
        Ok(SearchStatus::CompletedWithWarnings) => ExitCode::from(WARNINGS_EXIT),
        Err(e) => {
            eprintln!("{} {e:#}", "fu:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("FU_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<SearchStatus> {
    let stdout = io::stdout();
    let mut out = Printer {
        out:        BufWriter::new(stdout.lock()),
        show_score: cli.show_score,
        closed:     false,
    };

    let (warnings, stats, printed) = if cli.stream {
        let mut search = cli.builder();
        if let Some(window) = cli.window {
            search = search.streaming(window);
        }
        let mut stream = search.stream().context("cannot start search")?;
        let mut printed = 0;
        for m in stream.by_ref() {
            out.print(&m)?;
            if out.closed {
                break;
            }
            printed += 1;
        }
        let report = stream.into_inner().finish();
        (report.warnings, report.stats, printed)
    } else {
        let results = cli.builder().run().context("search failed")?;
        for m in &results.matches {
            out.print(m)?;
            if out.closed {
                break;
            }
        }
        let printed = results.matches.len();
        (results.warnings, results.stats, printed)
    };
    out.flush()?;

    for w in &warnings {
        report_warning(w);
    }
    if cli.stats {
        print_stats(&stats, printed);
    }

    Ok(if warnings.is_empty() {
        SearchStatus::Success
    } else {
        SearchStatus::CompletedWithWarnings
    })
}

/// Buffered stdout that goes quiet once the reader hangs up.
struct Printer<W: Write> {
    out:        W,
    show_score: bool,
    closed:     bool,
}

impl<W: Write> Printer<W> {
    fn print(&mut self, m: &Match) -> Result<()> {
        let written = if self.show_score {
            writeln!(self.out, "{}\t{}", m.score, m.path().display())
        } else {
            writeln!(self.out, "{}", m.path().display())
        };
        self.check(written)
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let flushed = self.out.flush();
        self.check(flushed)
    }

    fn check(&mut self, res: io::Result<()>) -> Result<()> {
        match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Ok(())
            }
            Err(e) => Err(e).context("cannot write to stdout"),
        }
    }
}

fn report_warning(w: &TraversalWarning) {
    eprintln!("{}", format!("fu: {w}").red());
}

fn print_stats(stats: &ScanStats, printed: usize) {
    let elapsed = Duration::from_millis(stats.duration.as_millis() as u64);
    eprintln!(
        "Traversed {} entries in {}, found {} matches.",
        stats.entries(),
        humantime::format_duration(elapsed),
        printed
    );
}
