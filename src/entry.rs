use std::fs::Metadata;
use std::path::PathBuf;

/// One filesystem object discovered while walking.
///
/// `metadata` is populated lazily, only when a filter asks for it through
/// [`Entry::metadata`]. The walker itself never stats entries it does not
/// need to, so name-only searches stay at one `readdir` per directory.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Absolute path, built from the canonical search root.
    pub path: PathBuf,

    /// The final path component.
    pub name: String,

    /// What kind of entry this is. Symlinks report `Symlink` even when
    /// they are followed into a directory.
    pub kind: EntryKind,

    /// How deep below the search root this entry was found. Root = 0.
    pub depth: usize,

    /// Filesystem metadata, populated on demand.
    pub metadata: Option<Metadata>,
}

impl Entry {
    /// Return the entry's metadata, reading it on first use.
    ///
    /// Symlinks are followed; a dangling link falls back to the link's own
    /// metadata. `None` means neither could be read.
    pub fn metadata(&mut self) -> Option<&Metadata> {
        if self.metadata.is_none() {
            self.metadata = std::fs::metadata(&self.path)
                .or_else(|_| std::fs::symlink_metadata(&self.path))
                .ok();
        }
        self.metadata.as_ref()
    }
}

/// The kind of a traversed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Dir,

    /// A symbolic link.
    Symlink,

    /// Anything else (device files, pipes, sockets, etc.).
    Other,
}

impl EntryKind {
    pub(crate) fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            Self::Symlink
        } else if ft.is_dir() {
            Self::Dir
        } else if ft.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}
