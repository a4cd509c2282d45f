use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a search before any traversal happens.
#[derive(Error, Debug)]
pub enum FuError {
    // Config
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid thread count: {0}")]
    InvalidThreadCount(usize),

    // Roots
    #[error("search root does not exist or is not a directory: {}", .0.display())]
    RootNotFound(PathBuf),

    // Runtime
    #[error("thread pool failure: {0}")]
    ThreadPool(String),
}

impl FuError {
    pub(crate) fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason:  reason.into(),
        }
    }
}

/// A recoverable problem on one subtree. The subtree is skipped and the walk
/// keeps going; warnings are handed back next to the results.
#[derive(Error, Debug)]
pub enum TraversalWarning {
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("symlink loop: {} -> {}", .link.display(), .target.display())]
    SymlinkLoop { link: PathBuf, target: PathBuf },

    /// The link leads into a directory that is searched through another
    /// route, so it is not entered.
    #[error("symlink target already searched: {} -> {}", .link.display(), .target.display())]
    AlreadySearched { link: PathBuf, target: PathBuf },

    #[error("broken symlink: {}", .0.display())]
    BrokenSymlink(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TraversalWarning {
    /// The path this warning was raised for.
    /// Callers use this to present "Skipped: <path>" without matching on variants.
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p) | Self::BrokenSymlink(p) => p,
            Self::SymlinkLoop { link, .. } | Self::AlreadySearched { link, .. } => link,
            Self::Io { path, .. } => path,
        }
    }

    /// Classify an I/O failure on `path`, folding permission errors into
    /// their own variant.
    pub(crate) fn from_io(path: PathBuf, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path)
        } else {
            Self::Io { path, source: err }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn permission_errors_are_classified() {
        let w = TraversalWarning::from_io(
            PathBuf::from("/c"),
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(w, TraversalWarning::PermissionDenied(_)));
        assert_eq!(w.path(), Path::new("/c"));

        let w = TraversalWarning::from_io(
            PathBuf::from("/d"),
            io::Error::new(io::ErrorKind::Other, "disk on fire"),
        );
        assert!(matches!(w, TraversalWarning::Io { .. }));
    }

    #[test]
    fn messages_name_the_path() {
        let err = FuError::invalid_pattern("[ab", "unterminated character class");
        assert_eq!(
            err.to_string(),
            "invalid pattern \"[ab\": unterminated character class"
        );

        let w = TraversalWarning::SymlinkLoop {
            link:   PathBuf::from("/a/loop"),
            target: PathBuf::from("/a"),
        };
        assert_eq!(w.to_string(), "symlink loop: /a/loop -> /a");
        assert_eq!(w.path(), Path::new("/a/loop"));

        let w = TraversalWarning::AlreadySearched {
            link:   PathBuf::from("/a/x"),
            target: PathBuf::from("/a/b"),
        };
        assert_eq!(w.to_string(), "symlink target already searched: /a/x -> /a/b");
        assert_eq!(w.path(), Path::new("/a/x"));
    }
}
