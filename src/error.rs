//! # Error Kinds
//!
//! Every fallible operation in the crate returns [`Result`] with a typed
//! [`Error`] variant; nothing panics on bad input or bad bytes. Variants
//! carry the page number, rowid, or offset needed to name the offending
//! row or table in an operator-facing message.
//!
//! [`Error::PageFull`] is special: the B-tree insert path catches it
//! internally and responds with a split. Seeing it escape a public entry
//! point indicates a bug in the split logic, not a caller mistake.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The database file could not be opened or created.
    #[error("failed to open database file {path:?}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An underlying read, write, or sync failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A page write persisted fewer bytes than a full page.
    #[error("short write on page {page_num}: {written} of {expected} bytes")]
    ShortWrite {
        page_num: u32,
        written: usize,
        expected: usize,
    },

    /// Every cached page is pinned; nothing can be evicted.
    #[error("page cache full: all {capacity} cached pages are pinned")]
    CacheFull { capacity: usize },

    /// The requested page lies beyond the end of the file.
    #[error("page {page_num} not found: file has {page_count} pages")]
    PageNotFound { page_num: u32, page_count: u32 },

    /// The page number is not addressable (0, or far past the file end).
    #[error("invalid page number {page_num}")]
    InvalidPageNum { page_num: u32 },

    /// A decoded node header is corrupt, or descent observed an
    /// integrity violation (broken key monotonicity, bad child page).
    #[error("invalid page header on page {page_num}: {reason}")]
    InvalidPageHeader { page_num: u32, reason: &'static str },

    /// A cell pointer references bytes outside the page's content region.
    #[error("invalid cell pointer on page {page_num}: slot {index} points at {offset}")]
    InvalidCellPointer {
        page_num: u32,
        index: usize,
        offset: usize,
    },

    /// A length or offset fell outside its permitted range.
    #[error("{what} out of bounds: {value} exceeds {limit}")]
    InvalidBounds {
        what: &'static str,
        value: usize,
        limit: usize,
    },

    /// A cell's bytes do not form a well-formed record.
    #[error("cell deserialization failed at offset {offset}: {reason}")]
    CellDeserializeFailed { offset: usize, reason: &'static str },

    /// The record could not be serialized, or failed validation against
    /// its table's column constraints.
    #[error("serialization failed: {reason}")]
    SerializationFailed { reason: &'static str },

    /// A node cannot fit another cell. Always handled inside the insert
    /// path by splitting; escaping here is a bug.
    #[error("page {page_num} full: need {needed} bytes, {available} free")]
    PageFull {
        page_num: u32,
        needed: usize,
        available: usize,
    },

    /// The rowid already exists in the target tree.
    #[error("duplicate rowid {rowid}")]
    DuplicateRowid { rowid: i64 },

    /// The rowid is absent from the target tree.
    #[error("no cell with rowid {rowid}")]
    CellNotFound { rowid: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_offender() {
        let err = Error::DuplicateRowid { rowid: 42 };
        assert_eq!(err.to_string(), "duplicate rowid 42");

        let err = Error::PageNotFound {
            page_num: 9,
            page_count: 3,
        };
        assert_eq!(err.to_string(), "page 9 not found: file has 3 pages");

        let err = Error::CacheFull { capacity: 16 };
        assert!(err.to_string().contains("16"));
    }

    #[test]
    fn io_error_converts() {
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
