//! # MagniDB - Embedded Single-File Storage Engine
//!
//! MagniDB persists typed rows into a single file organized as fixed-size
//! pages, indexes them by a monotonically assigned 64-bit row identifier,
//! and exposes ordered iteration, point lookup, insertion, and deletion
//! with at-most-one row per identifier.
//!
//! ## Quick Start
//!
//! ```ignore
//! use magnidb::{Database, Column, ColumnType, Value};
//!
//! let db = Database::open("./app.mdb")?;
//!
//! let columns = vec![
//!     Column::new("id", ColumnType::Integer).with_primary_key(),
//!     Column::new("name", ColumnType::Text).with_not_null(),
//! ];
//! let root = db.create_table("users", &columns,
//!     "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let tree = db.tree(root)?;
//! tree.insert(1, &[Value::Int(1), Value::text("Alice")])?;
//!
//! let arena = bumpalo::Bump::new();
//! let cell = tree.find(1, &arena)?;
//! ```
//!
//! ## Architecture
//!
//! MagniDB uses a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │       Public API (Database)          │
//! ├─────────────────────────────────────┤
//! │        Schema Catalog (page 1)       │
//! ├─────────────────────────────────────┤
//! │     B+Tree Index (rowid-keyed)       │
//! ├─────────────────────────────────────┤
//! │     Record Serialization Layer       │
//! ├─────────────────────────────────────┤
//! │     Pager (bounded page cache)       │
//! ├─────────────────────────────────────┤
//! │        Block File I/O (4 KiB)        │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! A database is one file. Page 1 carries the 100-byte database header
//! (magic, page size, page count, schema version) followed by the root
//! node of the schema tree; data pages begin at page 2. Table metadata
//! is stored as ordinary rows in the schema tree, keyed by a 63-bit
//! FNV-1a hash of the table name.
//!
//! ## Ownership of Decoded Rows
//!
//! Reading a row either borrows directly from the pinned page buffer
//! (closure-scoped, zero-copy) or deep-copies value bytes into a
//! caller-supplied [`bumpalo::Bump`] arena. The two paths are distinct
//! entry points, so a borrowed row can never outlive its page.
//!
//! ## Module Overview
//!
//! - [`storage`]: page cache with pin/dirty/evict discipline over file I/O
//! - [`records`]: variable-length record codec with typed serial codes
//! - [`btree`]: leaf/interior page layout, splits, ordered cursors
//! - [`schema`]: table descriptors and the page-1 catalog
//! - [`encoding`]: fixed-width and varint byte codecs
//! - [`database`]: open/close facade wiring the layers together
//!
//! ## Concurrency
//!
//! The pager serializes all public operations behind one mutex; rows and
//! cursors are local to a call or owned by the returned value. One thread
//! per database handle is the recommended usage.

pub mod btree;
pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod records;
pub mod schema;
pub mod storage;

pub use btree::{BTree, Cursor};
pub use database::Database;
pub use error::{Error, Result};
pub use records::{Cell, Value};
pub use schema::{Catalog, Column, ColumnType, Table};
pub use storage::{PageGuard, Pager};
