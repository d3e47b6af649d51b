//! # Schema Module
//!
//! Table descriptors and the catalog that persists them. The catalog
//! is not a separate storage format: it is one more B+tree, rooted on
//! page 1, whose rows describe every other tree in the file.
//!
//! - [`table`]: [`Column`], [`Table`], and descriptor validation
//! - [`catalog`]: the page-1 catalog facade and its row/blob codec

pub mod catalog;
pub mod table;

pub use catalog::{table_rowid, Catalog};
pub use table::{validate_columns, Column, ColumnType, Table};
