//! Pattern compilation.
//!
//! A raw pattern string is turned into one [`Pattern`] variant in a single
//! left-to-right pass. Any backtracking (glob `*`) happens at match time in
//! [`crate::matcher`], never here.
//!
//! Detection in [`MatchMode::Auto`] and [`MatchMode::Fuzzy`]:
//!
//! 1. glob metacharacters (`*`, `?`, `[`) present → [`Pattern::Glob`]
//! 2. fuzzy requested → [`Pattern::Fuzzy`]
//! 3. otherwise → [`Pattern::Exact`]
//!
//! A pattern containing `/` is *anchored*: it is matched against the path
//! relative to the search root instead of the entry's base name.

use std::iter::Peekable;
use std::str::{Chars, FromStr};

use regex::{Regex, RegexBuilder};

use crate::error::FuError;

/// Separator used inside anchored patterns and root-relative subjects.
pub const SEPARATOR: char = '/';

/// How the raw string should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Glob when metacharacters are present, exact otherwise.
    #[default]
    Auto,
    /// Literal text; metacharacters have no special meaning.
    Exact,
    /// Glob even without metacharacters.
    Glob,
    /// Fuzzy subsequence, unless metacharacters force a glob.
    Fuzzy,
    /// Names starting with the literal text.
    Prefix,
    /// Names ending with the literal text.
    Suffix,
    /// A regular expression searched within the subject.
    Regex,
}

/// Whether an exact pattern must equal the subject or only occur in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExactMode {
    #[default]
    Full,
    Substring,
}

/// Options that shape compilation.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub mode:           MatchMode,
    pub case_sensitive: bool,
    pub exact:          ExactMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            mode:           MatchMode::Auto,
            case_sensitive: true,
            exact:          ExactMode::Full,
        }
    }
}

/// A compiled pattern. Immutable once built and safe to share across
/// worker threads.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(ExactPattern),
    Glob(GlobPattern),
    Fuzzy(FuzzyPattern),
    Regex(RegexPattern),
}

#[derive(Debug, Clone)]
pub struct ExactPattern {
    /// Case-folded already when matching is case-insensitive.
    pub(crate) text:           String,
    pub(crate) mode:           ExactMode,
    pub(crate) case_sensitive: bool,
    pub(crate) anchored:       bool,
}

#[derive(Debug, Clone)]
pub struct GlobPattern {
    /// One token list per path segment; unanchored globs have exactly one.
    pub(crate) segments:       Vec<Vec<GlobToken>>,
    pub(crate) case_sensitive: bool,
    pub(crate) anchored:       bool,
    literal_prefix:            String,
}

#[derive(Debug, Clone)]
pub struct FuzzyPattern {
    /// Lowercased pattern characters, in order.
    pub(crate) chars:    Vec<char>,
    pub(crate) anchored: bool,
}

#[derive(Debug, Clone)]
pub struct RegexPattern {
    pub(crate) regex:          Regex,
    pub(crate) case_sensitive: bool,
    pub(crate) anchored:       bool,
}

/// One token of a glob segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobToken {
    /// A run of literal characters.
    Literal(Vec<char>),
    /// `?`: exactly one character.
    AnyChar,
    /// `*`: zero or more characters, never crossing a segment.
    AnyRun,
    /// `[...]`: one character from a set.
    Class(CharClass),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    negated: bool,
    items:   Vec<ClassItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassItem {
    Single(char),
    Range(char, char),
}

impl CharClass {
    pub(crate) fn matches(&self, c: char, case_sensitive: bool) -> bool {
        let hit = |c: char| {
            self.items.iter().any(|item| match *item {
                ClassItem::Single(x) => x == c,
                ClassItem::Range(lo, hi) => lo <= c && c <= hi,
            })
        };
        let found = hit(c)
            || (!case_sensitive && (c.to_lowercase().any(hit) || c.to_uppercase().any(hit)));
        found != self.negated
    }
}

impl Pattern {
    /// Whether the pattern is matched against the root-relative path.
    pub fn is_anchored(&self) -> bool {
        match self {
            Self::Exact(p) => p.anchored,
            Self::Glob(p) => p.anchored,
            Self::Fuzzy(p) => p.anchored,
            Self::Regex(p) => p.anchored,
        }
    }

    pub fn case_sensitive(&self) -> bool {
        match self {
            Self::Exact(p) => p.case_sensitive,
            Self::Glob(p) => p.case_sensitive,
            Self::Fuzzy(_) => false,
            Self::Regex(p) => p.case_sensitive,
        }
    }

    /// Literal text every matching subject must start with.
    ///
    /// Available for full exact patterns and for globs with a leading
    /// literal token. Case-folded when the pattern is case-insensitive.
    pub fn literal_prefix(&self) -> Option<&str> {
        match self {
            Self::Exact(p) if p.mode == ExactMode::Full => Some(&p.text),
            Self::Glob(p) if !p.literal_prefix.is_empty() => Some(&p.literal_prefix),
            _ => None,
        }
    }

    /// The exact number of path segments an anchored match must have, when
    /// the pattern fixes it.
    pub fn anchor_depth(&self) -> Option<usize> {
        match self {
            Self::Exact(p) if p.anchored && p.mode == ExactMode::Full => {
                Some(p.text.split(SEPARATOR).count())
            }
            Self::Glob(p) if p.anchored => Some(p.segments.len()),
            _ => None,
        }
    }

    /// Pick what this pattern is scored against: the base name, or the
    /// root-relative path for anchored patterns.
    pub fn subject<'a>(&self, name: &'a str, relative: &'a str) -> &'a str {
        if self.is_anchored() {
            relative
        } else {
            name
        }
    }
}

impl FromStr for Pattern {
    type Err = FuError;

    /// Compile with default options (auto detection, case-sensitive, full).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        compile(raw, &CompileOptions::default())
    }
}

/// Compile `raw` into a [`Pattern`].
///
/// # Errors
///
/// [`FuError::InvalidPattern`] for an empty string, an unterminated or
/// inverted character class, an empty path segment in an anchored pattern,
/// or an invalid regular expression.
pub fn compile(raw: &str, opts: &CompileOptions) -> Result<Pattern, FuError> {
    if raw.is_empty() {
        return Err(FuError::invalid_pattern(raw, "empty pattern"));
    }

    let cs = opts.case_sensitive;
    match opts.mode {
        MatchMode::Regex => compile_regex(raw, cs),
        MatchMode::Exact => compile_exact(raw, cs, opts.exact),
        MatchMode::Glob => compile_glob(raw, raw, cs),
        MatchMode::Prefix => compile_glob(raw, &format!("{}*", escape(raw)), cs),
        MatchMode::Suffix => compile_glob(raw, &format!("*{}", escape(raw)), cs),
        MatchMode::Auto if has_glob_meta(raw) => compile_glob(raw, raw, cs),
        MatchMode::Auto => compile_exact(raw, cs, opts.exact),
        MatchMode::Fuzzy if has_glob_meta(raw) => compile_glob(raw, raw, cs),
        MatchMode::Fuzzy => Ok(Pattern::Fuzzy(FuzzyPattern {
            chars:    raw.to_lowercase().chars().collect(),
            anchored: raw.contains(SEPARATOR),
        })),
    }
}

/// Whether `raw` contains glob metacharacters.
pub fn has_glob_meta(raw: &str) -> bool {
    raw.contains(['*', '?', '['])
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn check_segments(raw: &str) -> Result<bool, FuError> {
    let anchored = raw.contains(SEPARATOR);
    if anchored && raw.split(SEPARATOR).any(str::is_empty) {
        return Err(FuError::invalid_pattern(raw, "empty path segment"));
    }
    Ok(anchored)
}

fn compile_exact(raw: &str, cs: bool, mode: ExactMode) -> Result<Pattern, FuError> {
    let anchored = check_segments(raw)?;
    Ok(Pattern::Exact(ExactPattern {
        text: if cs { raw.to_owned() } else { raw.to_lowercase() },
        mode,
        case_sensitive: cs,
        anchored,
    }))
}

fn compile_regex(raw: &str, cs: bool) -> Result<Pattern, FuError> {
    let regex = RegexBuilder::new(raw)
        .case_insensitive(!cs)
        .build()
        .map_err(|e| FuError::invalid_pattern(raw, e.to_string()))?;
    Ok(Pattern::Regex(RegexPattern {
        regex,
        case_sensitive: cs,
        anchored: raw.contains(SEPARATOR),
    }))
}

/// `raw` is what the user typed (for error messages); `source` is the glob
/// text actually parsed.
fn compile_glob(raw: &str, source: &str, cs: bool) -> Result<Pattern, FuError> {
    let anchored = check_segments(source)?;

    let mut segments = Vec::new();
    let mut prefix = PrefixBuilder {
        text: String::new(),
        open: true,
        cs,
    };
    for (i, segment) in source.split(SEPARATOR).enumerate() {
        if i > 0 {
            prefix.push(SEPARATOR);
        }
        segments.push(parse_segment(raw, segment, cs, &mut prefix)?);
    }

    Ok(Pattern::Glob(GlobPattern {
        segments,
        case_sensitive: cs,
        anchored,
        literal_prefix: prefix.text,
    }))
}

/// Accumulates literal characters until the first wildcard.
struct PrefixBuilder {
    text: String,
    open: bool,
    cs:   bool,
}

impl PrefixBuilder {
    fn push(&mut self, c: char) {
        if !self.open {
            return;
        }
        if self.cs {
            self.text.push(c);
        } else {
            self.text.extend(c.to_lowercase());
        }
    }

    fn close(&mut self) {
        self.open = false;
    }
}

fn parse_segment(
    raw: &str,
    segment: &str,
    cs: bool,
    prefix: &mut PrefixBuilder,
) -> Result<Vec<GlobToken>, FuError> {
    let mut tokens = Vec::new();
    let mut literal: Vec<char> = Vec::new();
    let mut chars = segment.chars().peekable();

    let flush = |literal: &mut Vec<char>, tokens: &mut Vec<GlobToken>| {
        if !literal.is_empty() {
            tokens.push(GlobToken::Literal(std::mem::take(literal)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                flush(&mut literal, &mut tokens);
                // Consecutive stars collapse.
                if tokens.last() != Some(&GlobToken::AnyRun) {
                    tokens.push(GlobToken::AnyRun);
                }
                prefix.close();
            }
            '?' => {
                flush(&mut literal, &mut tokens);
                tokens.push(GlobToken::AnyChar);
                prefix.close();
            }
            '[' => {
                flush(&mut literal, &mut tokens);
                tokens.push(GlobToken::Class(parse_class(raw, &mut chars)?));
                prefix.close();
            }
            c => {
                // A trailing backslash stands for itself.
                let c = if c == '\\' { chars.next().unwrap_or('\\') } else { c };
                prefix.push(c);
                if cs {
                    literal.push(c);
                } else {
                    literal.extend(c.to_lowercase());
                }
            }
        }
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

/// Parse a class body; the opening `[` is already consumed.
fn parse_class(raw: &str, chars: &mut Peekable<Chars<'_>>) -> Result<CharClass, FuError> {
    let unterminated = || FuError::invalid_pattern(raw, "unterminated character class");

    let mut negated = false;
    if matches!(chars.peek(), Some('!') | Some('^')) {
        negated = true;
        chars.next();
    }

    let mut items = Vec::new();
    let mut first = true;
    loop {
        let c = chars.next().ok_or_else(unterminated)?;
        // A `]` right after the opening bracket is a member, not the end.
        if c == ']' && !first {
            break;
        }
        first = false;
        let lo = if c == '\\' { chars.next().ok_or_else(unterminated)? } else { c };

        if chars.peek() != Some(&'-') {
            items.push(ClassItem::Single(lo));
            continue;
        }
        let mut ahead = chars.clone();
        ahead.next();
        match ahead.next() {
            // `-` before the closing bracket is a literal member.
            Some(']') | None => items.push(ClassItem::Single(lo)),
            Some(_) => {
                chars.next();
                let hi = chars.next().ok_or_else(unterminated)?;
                let hi = if hi == '\\' { chars.next().ok_or_else(unterminated)? } else { hi };
                if hi < lo {
                    return Err(FuError::invalid_pattern(
                        raw,
                        format!("invalid class range {lo}-{hi}"),
                    ));
                }
                items.push(ClassItem::Range(lo, hi));
            }
        }
    }

    Ok(CharClass { negated, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_mode(raw: &str, mode: MatchMode) -> Pattern {
        compile(
            raw,
            &CompileOptions {
                mode,
                ..CompileOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn detection_rules() {
        assert!(matches!(with_mode("foo", MatchMode::Auto), Pattern::Exact(_)));
        assert!(matches!(with_mode("*.txt", MatchMode::Auto), Pattern::Glob(_)));
        assert!(matches!(with_mode("foo", MatchMode::Fuzzy), Pattern::Fuzzy(_)));
        // metacharacters win over a fuzzy request
        assert!(matches!(with_mode("f?o", MatchMode::Fuzzy), Pattern::Glob(_)));
        assert!(matches!(with_mode("*.txt", MatchMode::Exact), Pattern::Exact(_)));
        assert!(matches!(with_mode("a.+b", MatchMode::Regex), Pattern::Regex(_)));
    }

    #[test]
    fn rejects_empty_and_unterminated() {
        let opts = CompileOptions::default();
        assert!(matches!(
            compile("", &opts),
            Err(FuError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile("foo[ab", &opts),
            Err(FuError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile("[]", &opts),
            Err(FuError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile("[z-a]", &opts),
            Err(FuError::InvalidPattern { .. })
        ));
        assert!(matches!(
            compile("src//*.rs", &opts),
            Err(FuError::InvalidPattern { .. })
        ));
        let regex = CompileOptions {
            mode: MatchMode::Regex,
            ..opts
        };
        assert!(matches!(
            compile("(unclosed", &regex),
            Err(FuError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn class_parsing() {
        let Pattern::Glob(glob) = with_mode("[!a-c]x", MatchMode::Auto) else {
            panic!("expected glob");
        };
        let GlobToken::Class(class) = &glob.segments[0][0] else {
            panic!("expected class");
        };
        assert!(class.matches('d', true));
        assert!(!class.matches('b', true));

        // leading `]` is a member, trailing `-` is a literal
        let Pattern::Glob(glob) = with_mode("[]-]", MatchMode::Auto) else {
            panic!("expected glob");
        };
        let GlobToken::Class(class) = &glob.segments[0][0] else {
            panic!("expected class");
        };
        assert!(class.matches(']', true));
        assert!(class.matches('-', true));
        assert!(!class.matches('a', true));
    }

    #[test]
    fn stars_collapse_and_escapes_are_literal() {
        let Pattern::Glob(glob) = with_mode("a**\\*", MatchMode::Auto) else {
            panic!("expected glob");
        };
        assert_eq!(
            glob.segments[0],
            vec![
                GlobToken::Literal(vec!['a']),
                GlobToken::AnyRun,
                GlobToken::Literal(vec!['*']),
            ]
        );
    }

    #[test]
    fn literal_prefix_and_anchor_depth() {
        let p = with_mode("src/ma*.rs", MatchMode::Auto);
        assert!(p.is_anchored());
        assert_eq!(p.literal_prefix(), Some("src/ma"));
        assert_eq!(p.anchor_depth(), Some(2));

        let p = with_mode("*.rs", MatchMode::Auto);
        assert!(!p.is_anchored());
        assert_eq!(p.literal_prefix(), None);
        assert_eq!(p.anchor_depth(), None);

        let p = with_mode("foo", MatchMode::Fuzzy);
        assert_eq!(p.literal_prefix(), None);

        let substring = compile(
            "foo",
            &CompileOptions {
                exact: ExactMode::Substring,
                ..CompileOptions::default()
            },
        )
        .unwrap();
        assert_eq!(substring.literal_prefix(), None);
    }

    #[test]
    fn case_insensitive_prefix_is_folded() {
        let p = compile(
            "Src/Main*",
            &CompileOptions {
                case_sensitive: false,
                ..CompileOptions::default()
            },
        )
        .unwrap();
        assert_eq!(p.literal_prefix(), Some("src/main"));
    }

    #[test]
    fn prefix_and_suffix_modes_escape_input() {
        let Pattern::Glob(glob) = with_mode("a*", MatchMode::Prefix) else {
            panic!("expected glob");
        };
        assert_eq!(
            glob.segments[0],
            vec![GlobToken::Literal(vec!['a', '*']), GlobToken::AnyRun]
        );
        assert_eq!(with_mode("log", MatchMode::Prefix).literal_prefix(), Some("log"));
        assert_eq!(with_mode(".rs", MatchMode::Suffix).literal_prefix(), None);
    }

    #[test]
    fn from_str_uses_defaults() {
        let p: Pattern = "Cargo.toml".parse().unwrap();
        assert!(matches!(p, Pattern::Exact(_)));
        assert!(p.case_sensitive());
    }
}
