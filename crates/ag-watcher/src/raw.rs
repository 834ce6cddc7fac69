//! Raw change records as decoded from an OS notification facility.

/// The condition a [`RawEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawEventKind {
    /// An entry was created in the watched directory.
    Create,
    /// An entry was deleted from the watched directory.
    Delete,
    /// A file's contents were written.
    Modify,
    /// An entry was moved out of the watched directory.
    MovedFrom,
    /// An entry was moved into the watched directory.
    MovedTo,
    /// The OS dropped the watch (directory removed or unmounted).
    Ignored,
    /// The OS event queue overflowed; records were lost.
    Overflow,
}

/// One decoded record.
///
/// `name` is relative to the directory identified by `handle`; it is `None`
/// for records about the watched directory itself (and for overflows).
/// `cookie` pairs the two halves of a rename and is `0` when unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent<H> {
    /// Watch handle the record was reported against.
    pub handle: H,
    /// What happened.
    pub kind: RawEventKind,
    /// Rename correlation token.
    pub cookie: u32,
    /// Entry name within the watched directory.
    pub name: Option<String>,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl<H> RawEvent<H> {
    /// Creates a nameless record with no cookie, about a non-directory.
    #[must_use]
    pub const fn new(handle: H, kind: RawEventKind) -> Self {
        Self {
            handle,
            kind,
            cookie: 0,
            name: None,
            is_directory: false,
        }
    }

    /// Sets the entry name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the rename cookie.
    #[must_use]
    pub const fn with_cookie(mut self, cookie: u32) -> Self {
        self.cookie = cookie;
        self
    }

    /// Marks the entry as a directory.
    #[must_use]
    pub const fn directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }
}
