//! # Table and Column Descriptors
//!
//! Schema metadata as plain structs: a [`Table`] names its root page,
//! its original DDL text, and up to [`MAX_COLS`] typed [`Column`]s.
//!
//! ## Invariants
//!
//! Enforced by [`validate_columns`] before a table enters the catalog:
//!
//! - at most one column is marked PRIMARY KEY;
//! - column names are unique within the table;
//! - at most [`MAX_COLS`] columns.
//!
//! A table's root page must be a data page (≥ 2); the catalog checks
//! that at registration, since page 1 is the catalog itself.

use crate::config::MAX_COLS;
use crate::error::{Error, Result};

/// Storage class of a column.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer = 0,
    Text = 1,
    Real = 2,
    Blob = 3,
}

impl ColumnType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ColumnType::Integer),
            1 => Some(ColumnType::Text),
            2 => Some(ColumnType::Real),
            3 => Some(ColumnType::Blob),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
            ColumnType::Real => "REAL",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    not_null: bool,
    primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            primary_key: false,
        }
    }

    pub fn with_not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn not_null(&self) -> bool {
        self.not_null
    }

    pub fn primary_key(&self) -> bool {
        self.primary_key
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    root_page: u32,
    sql: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        root_page: u32,
        sql: impl Into<String>,
        columns: Vec<Column>,
    ) -> Self {
        Self {
            name: name.into(),
            root_page,
            sql: sql.into(),
            columns,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }
}

/// Checks the descriptor invariants for a column list.
pub fn validate_columns(columns: &[Column]) -> Result<()> {
    if columns.len() > MAX_COLS {
        return Err(Error::InvalidBounds {
            what: "column count",
            value: columns.len(),
            limit: MAX_COLS,
        });
    }

    let mut primary_keys = 0;
    for (i, column) in columns.iter().enumerate() {
        if column.primary_key() {
            primary_keys += 1;
        }
        if columns[..i].iter().any(|c| c.name() == column.name()) {
            return Err(Error::SerializationFailed {
                reason: "duplicate column name",
            });
        }
    }
    if primary_keys > 1 {
        return Err(Error::SerializationFailed {
            reason: "more than one primary key column",
        });
    }
    Ok(())
}
