use {
    crate::{ContentHash, credentials::InitVector},
    derive_more::Display,
};

/// Largest number of files in one session.
///
/// One less than `u16::MAX` so that the "no more files" index `len + 1`
/// still fits into the two-byte index of a response.
pub const MAX_FILES: usize = 65534;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FileStatus {
    /// Not yet handled in this session.
    #[display("pending")]
    Pending,
    /// Content already stored by the receiver; never sent.
    #[display("duplicate")]
    Duplicate,
    #[display("transferred")]
    Transferred,
    #[display("failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Base name of the file, at most [`NAME_LEN`](crate::NAME_LEN) bytes on the wire.
    pub name: String,
    /// Size of the raw content, without cipher padding.
    pub size: u32,
    pub hash: ContentHash,
    pub status: FileStatus,
}

impl FileEntry {
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, size: u32, hash: ContentHash) -> Self {
        Self {
            name: name.into(),
            size,
            hash,
            status: FileStatus::Pending,
        }
    }
}

/// Files offered in one transfer session together with the session's IV.
///
/// Protocol indices are 1-based; [`Manifest::entry`] and
/// [`Manifest::entry_mut`] are the only places where they are converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    init_vector: InitVector,
    entries: Vec<FileEntry>,
}

impl Manifest {
    #[must_use]
    #[inline]
    pub fn new(init_vector: InitVector) -> Self {
        Self {
            init_vector,
            entries: Vec::new(),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_entries(init_vector: InitVector, entries: Vec<FileEntry>) -> Self {
        Self {
            init_vector,
            entries,
        }
    }

    #[inline]
    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    #[inline]
    pub fn init_vector(&self) -> &InitVector {
        &self.init_vector
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    #[inline]
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut FileEntry> {
        self.entries.iter_mut()
    }

    /// Returns the entry at a 1-based protocol index.
    #[must_use]
    #[inline]
    pub fn entry(&self, index: u16) -> Option<&FileEntry> {
        self.entries.get(usize::from(index.checked_sub(1)?))
    }

    #[inline]
    pub fn entry_mut(&mut self, index: u16) -> Option<&mut FileEntry> {
        self.entries.get_mut(usize::from(index.checked_sub(1)?))
    }

    /// Index that tells the other side there are no more files.
    #[must_use]
    #[inline]
    pub fn end_index(&self) -> u16 {
        u16::try_from(self.entries.len())
            .ok()
            .and_then(|len| len.checked_add(1))
            .unwrap_or(u16::MAX)
    }

    #[must_use]
    #[inline]
    pub fn count(&self, status: FileStatus) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status == status)
            .count()
    }
}
