//! # MagniDB Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together. Constants that depend on each other
//! are co-located and guarded by compile-time assertions to prevent
//! mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> DB_HEADER_SIZE (100 bytes, page 1 only)
//!       │
//!       ├─> BTREE_HEADER_SIZE (8) + BTREE_EXTENSION_SIZE (4)
//!       │     Every tree node starts with the 8-byte common header and
//!       │     a 4-byte type-specific extension (rightmost child pointer
//!       │     for interior nodes, next-leaf pointer for leaves).
//!       │
//!       ├─> SCHEMA_CONTENT_START (derived: 100 + 12)
//!       │     Page 1 places its node header after the database header.
//!       │
//!       └─> MAX_CELL_SIZE (derived)
//!             Largest serialized cell the insert path accepts. Bounded
//!             to a quarter of the tightest content region (page 1's) so
//!             a split always produces room for the pending cell.
//!
//! DEFAULT_CACHE_PAGES (64)
//!       │
//!       └─> Must exceed the tree height times the pages pinned per
//!           descent, or deep inserts would exhaust the cache.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `PAGE_SIZE` fits in a `u16` cell-content offset.
//! 2. `MAX_CELL_SIZE` leaves room for at least four cells per node.
//! 3. The database header and one node header fit on page 1.

// ============================================================================
// PAGE GEOMETRY
// ============================================================================

/// Size of each database page in bytes. The fundamental unit of I/O
/// and caching.
pub const PAGE_SIZE: usize = 4096;

/// Size of the database header at the start of page 1.
pub const DB_HEADER_SIZE: usize = 100;

/// Size of the common node header shared by leaf and interior pages.
pub const BTREE_HEADER_SIZE: usize = 8;

/// Size of the type-specific node header extension.
pub const BTREE_EXTENSION_SIZE: usize = 4;

/// Combined node header size: common header plus extension.
pub const BTREE_NODE_HEADER_SIZE: usize = BTREE_HEADER_SIZE + BTREE_EXTENSION_SIZE;

/// Width of one entry in a node's cell pointer array.
pub const CELL_POINTER_SIZE: usize = 2;

/// First byte of the schema tree's node header on page 1.
pub const SCHEMA_CONTENT_START: usize = DB_HEADER_SIZE + BTREE_NODE_HEADER_SIZE;

// Cell content offsets are stored as u16.
const _: () = assert!(PAGE_SIZE <= u16::MAX as usize + 1);

const _: () = assert!(SCHEMA_CONTENT_START == 112, "schema header derivation mismatch");

// ============================================================================
// ON-DISK IDENTITY
// ============================================================================

/// File magic at offset 0 of page 1. Records the header-page convention:
/// page 1 holds the database header, data pages begin at 2.
pub const MAGIC: [u8; 13] = *b"MAGNI_DB_v1.0";

/// Current schema format version.
pub const SCHEMA_VERSION: u32 = 1;

/// Page holding the database header and the schema tree's root node.
pub const SCHEMA_ROOT_PAGE: u32 = 1;

/// First page available for table data.
pub const FIRST_DATA_PAGE: u32 = 2;

// ============================================================================
// ENGINE LIMITS
// ============================================================================

/// Default page cache capacity, in pages.
pub const DEFAULT_CACHE_PAGES: usize = 64;

/// Smallest usable cache: a split touches a root-to-leaf path twice plus
/// two fresh siblings.
pub const MIN_CACHE_PAGES: usize = 8;

/// Maximum number of columns per table.
pub const MAX_COLS: usize = 10;

/// Longest varint encoding in bytes.
pub const MAX_VARINT_LEN: usize = 9;

/// Largest serialized cell accepted by the insert path. There are no
/// overflow pages, so the bound guarantees any split leaves room for
/// the pending cell on one of the two halves. Derived from page 1's
/// content region, the tightest of any page.
pub const MAX_CELL_SIZE: usize =
    (PAGE_SIZE - DB_HEADER_SIZE - BTREE_NODE_HEADER_SIZE - CELL_POINTER_SIZE) / 4;

const _: () = assert!(DEFAULT_CACHE_PAGES >= MIN_CACHE_PAGES);

const _: () = assert!(
    MAX_CELL_SIZE * 4 <= PAGE_SIZE - DB_HEADER_SIZE - BTREE_NODE_HEADER_SIZE,
    "MAX_CELL_SIZE must leave room for four cells on the tightest page"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_sizes_line_up() {
        assert_eq!(BTREE_NODE_HEADER_SIZE, 12);
        assert_eq!(SCHEMA_CONTENT_START, 112);
        assert_eq!(MAGIC.len(), 13);
    }

    #[test]
    fn max_cell_size_fits_every_page() {
        assert!(MAX_CELL_SIZE < PAGE_SIZE - SCHEMA_CONTENT_START);
        assert!(MAX_CELL_SIZE >= 900);
    }
}
