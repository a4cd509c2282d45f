//! Scoring a compiled [`Pattern`] against one subject string.
//!
//! Every function here is pure: no shared state, no allocation that
//! outlives the call. Workers call [`score`] concurrently on the same
//! pattern.

use std::borrow::Cow;
use std::fmt;

use crate::pattern::{
    ExactMode, ExactPattern, FuzzyPattern, GlobPattern, GlobToken, Pattern, RegexPattern,
    SEPARATOR,
};

/// Base ordering between strategies. Later variants rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Fuzzy,
    Regex,
    Glob,
    Exact,
}

/// Relevance of one match; higher is better. Tiers compare first, points
/// only break ties inside a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score {
    pub tier:   Tier,
    pub points: u32,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self.tier {
            Tier::Fuzzy => "fuzzy",
            Tier::Regex => "regex",
            Tier::Glob => "glob",
            Tier::Exact => "exact",
        };
        write!(f, "{tier}:{}", self.points)
    }
}

/// Points for an exact pattern equal to the whole subject.
pub const EXACT_FULL: u32 = 1000;
/// Points for an exact pattern found inside the subject.
pub const EXACT_SUBSTRING: u32 = 500;

/// Fixed-point scale for ratio scores (glob, regex).
const SCALE: usize = 1000;

// Fuzzy weights
const FUZZY_BASE: i64 = 100;
const FUZZY_CONTIGUOUS: i64 = 15;
const FUZZY_START: i64 = 60;
const FUZZY_BOUNDARY: i64 = 20;
const FUZZY_FULL: i64 = 40;
const FUZZY_LEADING_CAP: i64 = 15;
const FUZZY_GAP: i64 = 3;
const FUZZY_GAP_CAP: i64 = 60;

/// Score `candidate` against `pattern`, or `None` when it does not match.
pub fn score(pattern: &Pattern, candidate: &str) -> Option<Score> {
    match pattern {
        Pattern::Exact(p) => score_exact(p, candidate),
        Pattern::Glob(p) => score_glob(p, candidate),
        Pattern::Fuzzy(p) => score_fuzzy(p, candidate),
        Pattern::Regex(p) => score_regex(p, candidate),
    }
}

fn fold(candidate: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(candidate)
    } else {
        Cow::Owned(candidate.to_lowercase())
    }
}

fn ratio(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part.min(whole) * SCALE / whole) as u32
    }
}

fn score_exact(p: &ExactPattern, candidate: &str) -> Option<Score> {
    let subject = fold(candidate, p.case_sensitive);
    let points = if *subject == *p.text {
        EXACT_FULL
    } else if p.mode == ExactMode::Substring && subject.contains(p.text.as_str()) {
        EXACT_SUBSTRING
    } else {
        return None;
    };
    Some(Score {
        tier: Tier::Exact,
        points,
    })
}

fn score_glob(p: &GlobPattern, candidate: &str) -> Option<Score> {
    let subject = fold(candidate, p.case_sensitive);
    let parts: Vec<&str> = if p.anchored {
        subject.split(SEPARATOR).collect()
    } else {
        vec![&*subject]
    };
    if parts.len() != p.segments.len() {
        return None;
    }

    let mut literal = 0;
    let mut total = 0;
    for (tokens, part) in p.segments.iter().zip(parts) {
        let chars: Vec<char> = part.chars().collect();
        if !glob_match(tokens, &chars, p.case_sensitive) {
            return None;
        }
        literal += tokens
            .iter()
            .map(|t| match t {
                GlobToken::Literal(l) => l.len(),
                _ => 0,
            })
            .sum::<usize>();
        total += chars.len();
    }

    Some(Score {
        tier:   Tier::Glob,
        points: ratio(literal, total),
    })
}

/// Match one segment. `*` backtracks to the most recent star only, which
/// keeps the walk linear in practice.
fn glob_match(tokens: &[GlobToken], text: &[char], case_sensitive: bool) -> bool {
    let (mut ti, mut pi) = (0, 0);
    // (token after the last star, text position that star currently covers up to)
    let mut star: Option<(usize, usize)> = None;

    loop {
        if let Some(token) = tokens.get(ti) {
            let advanced = match token {
                GlobToken::AnyRun => {
                    star = Some((ti + 1, pi));
                    ti += 1;
                    continue;
                }
                GlobToken::AnyChar if pi < text.len() => Some(1),
                GlobToken::Class(class)
                    if pi < text.len() && class.matches(text[pi], case_sensitive) =>
                {
                    Some(1)
                }
                GlobToken::Literal(lit) if text[pi..].starts_with(lit) => Some(lit.len()),
                _ => None,
            };
            if let Some(n) = advanced {
                ti += 1;
                pi += n;
                continue;
            }
        } else if pi == text.len() {
            return true;
        }

        match star {
            Some((after, covered)) if covered < text.len() => {
                star = Some((after, covered + 1));
                ti = after;
                pi = covered + 1;
            }
            _ => return false,
        }
    }
}

fn score_fuzzy(p: &FuzzyPattern, candidate: &str) -> Option<Score> {
    let subject: Vec<char> = candidate.to_lowercase().chars().collect();
    fuzzy_points(&p.chars, &subject).map(|points| Score {
        tier: Tier::Fuzzy,
        points,
    })
}

/// Best alignment of `pattern` as a subsequence of `subject`, trying every
/// start position of the first character.
fn fuzzy_points(pattern: &[char], subject: &[char]) -> Option<u32> {
    let (&first, rest) = pattern.split_first()?;

    let mut best: Option<i64> = None;
    for start in (0..subject.len()).filter(|&i| subject[i] == first) {
        // Later starts only push every position further right.
        let Some(positions) = align(rest, subject, start) else {
            break;
        };
        let s = rank(&positions, subject);
        best = Some(best.map_or(s, |b| b.max(s)));
    }
    best.map(|s| s.max(1) as u32)
}

fn align(rest: &[char], subject: &[char], start: usize) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(rest.len() + 1);
    positions.push(start);
    let mut i = start + 1;
    for &pc in rest {
        while i < subject.len() && subject[i] != pc {
            i += 1;
        }
        if i == subject.len() {
            return None;
        }
        positions.push(i);
        i += 1;
    }
    Some(positions)
}

fn rank(positions: &[usize], subject: &[char]) -> i64 {
    let mut s = FUZZY_BASE;

    let mut gap = 0;
    for w in positions.windows(2) {
        if w[1] == w[0] + 1 {
            s += FUZZY_CONTIGUOUS;
        } else {
            gap += (w[1] - w[0] - 1) as i64;
        }
    }
    s -= (gap * FUZZY_GAP).min(FUZZY_GAP_CAP);

    let first = positions[0];
    if first == 0 {
        s += FUZZY_START;
    } else {
        s -= (first as i64).min(FUZZY_LEADING_CAP);
    }

    for &pos in positions {
        if pos > 0 && is_boundary(subject[pos - 1]) {
            s += FUZZY_BOUNDARY;
        }
    }

    if positions.len() == subject.len() {
        s += FUZZY_FULL;
    }
    s
}

fn is_boundary(c: char) -> bool {
    matches!(c, '.' | '_' | '-' | ' ' | SEPARATOR)
}

fn score_regex(p: &RegexPattern, candidate: &str) -> Option<Score> {
    let m = p.regex.find(candidate)?;
    Some(Score {
        tier:   Tier::Regex,
        points: ratio(m.as_str().chars().count(), candidate.chars().count()),
    })
}
