//! # Schema Catalog
//!
//! Table metadata lives as ordinary rows in a dedicated tree rooted on
//! page 1. Each row carries six values in fixed column order:
//!
//! | Slot | Value | Content |
//! |---|---|---|
//! | 0 | text | object type, currently always `"table"` |
//! | 1 | text | object name |
//! | 2 | text | owning table name (same as slot 1 for tables) |
//! | 3 | integer | root page of the object's tree |
//! | 4 | text | original DDL text |
//! | 5 | blob | packed column list |
//!
//! The rowid is the 64-bit FNV-1a hash of the name masked to 63 bits;
//! a collision surfaces as [`Error::DuplicateRowid`] and is treated as
//! a schema error.
//!
//! ## Column Blob
//!
//! The logical column list does not fit the fixed six-slot row shape,
//! so it is packed into slot 5:
//!
//! ```text
//! u32 LE count
//! repeat count times:
//!     u32 LE name_len ‖ name bytes ‖ u8 type ‖ u8 flags
//! ```
//!
//! `flags` bit 0 is NOT NULL, bit 1 is PRIMARY KEY.

use bumpalo::Bump;
use tracing::debug;

use crate::btree::BTree;
use crate::config::{FIRST_DATA_PAGE, MAX_COLS, SCHEMA_ROOT_PAGE};
use crate::encoding::bytes;
use crate::error::{Error, Result};
use crate::records::{Cell, Value};
use crate::schema::table::{validate_columns, Column, ColumnType, Table};
use crate::storage::Pager;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const ROWID_MASK: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Catalog rowid for a table name: FNV-1a, masked to 63 bits so it is
/// always a non-negative rowid.
pub fn table_rowid(name: &str) -> i64 {
    let mut hash = FNV_OFFSET;
    for &byte in name.as_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash & ROWID_MASK) as i64
}

fn encode_columns(columns: &[Column]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend((columns.len() as u32).to_le_bytes());
    for column in columns {
        let name = column.name().as_bytes();
        buf.extend((name.len() as u32).to_le_bytes());
        buf.extend(name);
        buf.push(column.column_type() as u8);
        let mut flags = 0u8;
        if column.not_null() {
            flags |= 1;
        }
        if column.primary_key() {
            flags |= 2;
        }
        buf.push(flags);
    }
    buf
}

fn decode_columns(blob: &[u8]) -> Result<Vec<Column>> {
    let fail = |offset, reason| Error::CellDeserializeFailed { offset, reason };

    let count = bytes::read_u32_le(blob, 0)? as usize;
    if count > MAX_COLS {
        return Err(fail(0, "column count exceeds maximum"));
    }

    let mut columns = Vec::with_capacity(count);
    let mut pos = 4;
    for _ in 0..count {
        let name_len = bytes::read_u32_le(blob, pos)? as usize;
        pos += 4;
        let name_bytes = blob
            .get(pos..pos + name_len)
            .ok_or_else(|| fail(pos, "column name runs past blob"))?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| fail(pos, "column name is not valid UTF-8"))?;
        pos += name_len;

        let type_byte = *blob
            .get(pos)
            .ok_or_else(|| fail(pos, "column entry truncated"))?;
        let flags = *blob
            .get(pos + 1)
            .ok_or_else(|| fail(pos, "column entry truncated"))?;
        pos += 2;

        let column_type =
            ColumnType::from_byte(type_byte).ok_or_else(|| fail(pos, "unknown column type"))?;
        let mut column = Column::new(name, column_type);
        if flags & 1 != 0 {
            column = column.with_not_null();
        }
        if flags & 2 != 0 {
            column = column.with_primary_key();
        }
        columns.push(column);
    }

    if pos != blob.len() {
        return Err(fail(pos, "trailing bytes in column blob"));
    }
    Ok(columns)
}

fn table_from_cell(cell: &Cell<'_>) -> Result<Table> {
    let fail = || Error::CellDeserializeFailed {
        offset: 0,
        reason: "malformed catalog row",
    };

    if cell.values.len() != 6 {
        return Err(fail());
    }
    if cell.values[0].as_text() != Some("table") {
        return Err(fail());
    }
    let name = cell.values[1].as_text().ok_or_else(fail)?;
    let root_page = cell.values[3].as_int().ok_or_else(fail)?;
    if root_page < FIRST_DATA_PAGE as i64 || root_page > u32::MAX as i64 {
        return Err(fail());
    }
    let sql = cell.values[4].as_text().ok_or_else(fail)?;
    let blob = cell.values[5].as_blob().ok_or_else(fail)?;

    Ok(Table::new(
        name,
        root_page as u32,
        sql,
        decode_columns(blob)?,
    ))
}

/// The schema catalog: a facade over the tree on page 1.
pub struct Catalog<'p> {
    tree: BTree<'p>,
}

impl<'p> Catalog<'p> {
    /// Opens the catalog of an initialized database file.
    pub fn open(pager: &'p Pager) -> Result<Self> {
        Ok(Self {
            tree: BTree::open(pager, SCHEMA_ROOT_PAGE)?,
        })
    }

    /// Registers a table. Fails with [`Error::DuplicateRowid`] if the
    /// name (or its 63-bit hash) is already present.
    pub fn add_table(
        &self,
        name: &str,
        columns: &[Column],
        root_page: u32,
        sql: &str,
    ) -> Result<()> {
        validate_columns(columns)?;
        if root_page < FIRST_DATA_PAGE {
            return Err(Error::InvalidPageNum {
                page_num: root_page,
            });
        }

        let blob = encode_columns(columns);
        let values = [
            Value::text("table"),
            Value::text(name),
            Value::text(name),
            Value::Int(root_page as i64),
            Value::text(sql),
            Value::blob(&blob),
        ];
        self.tree.insert(table_rowid(name), &values)?;
        debug!(table = name, root_page, "added table to catalog");
        Ok(())
    }

    /// Root page of the named table, without decoding the descriptor.
    pub fn find_table(&self, name: &str) -> Result<Option<u32>> {
        let lookup = self
            .tree
            .find_zero_copy(table_rowid(name), |cell| {
                cell.values.get(3).and_then(Value::as_int)
            });
        match lookup {
            Ok(Some(root)) if (FIRST_DATA_PAGE as i64..=u32::MAX as i64).contains(&root) => {
                Ok(Some(root as u32))
            }
            Ok(_) => Err(Error::CellDeserializeFailed {
                offset: 0,
                reason: "malformed catalog row",
            }),
            Err(Error::CellNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Full descriptor of the named table, deep-copied out of the
    /// catalog page. Fails with [`Error::CellNotFound`] if absent.
    pub fn get_table(&self, name: &str) -> Result<Table> {
        let arena = Bump::new();
        let cell = self.tree.find(table_rowid(name), &arena)?;
        table_from_cell(&cell)
    }

    /// Every registered table, in rowid (name-hash) order.
    pub fn list_tables(&self) -> Result<Vec<Table>> {
        let arena = Bump::new();
        let mut cursor = self.tree.cursor()?;
        let mut tables = Vec::new();
        while cursor.is_valid() {
            let cell = cursor.cell(&arena)?;
            tables.push(table_from_cell(&cell)?);
            cursor.advance()?;
        }
        Ok(tables)
    }

    /// Unregisters a table. The table's data pages are not reclaimed
    /// (there is no free-page accounting beyond the pager's counters).
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.tree.delete(table_rowid(name))?;
        debug!(table = name, "dropped table from catalog");
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.find_table(name)?.is_some())
    }

    /// The underlying catalog tree.
    pub fn tree(&self) -> &BTree<'p> {
        &self.tree
    }
}
