//! # Cell Codec
//!
//! A cell is one serialized `(rowid, values)` record inside a leaf page:
//!
//! ```text
//! varint(payload_size) ‖ varint(rowid) ‖ varint(header_size)
//!     ‖ varint(serial_type) × N ‖ value_bytes × N
//! ```
//!
//! `payload_size` counts every byte after its own varint; `header_size`
//! counts only the serial-type varints. Deserialization verifies that
//! the declared sizes agree with the decoded content exactly.
//!
//! ## Ownership
//!
//! The codec offers two decode paths with statically distinct
//! lifetimes:
//!
//! - [`deserialize_borrowed`] returns a [`Cell`] whose text and blob
//!   values point into the source buffer. The cell must not outlive the
//!   buffer — in practice, the pinned page it came from.
//! - [`deserialize_in`] deep-copies value bytes into a caller-supplied
//!   [`bumpalo::Bump`]; the cell lives as long as the arena, and drop
//!   glue can never free page memory.
//!
//! Integers and floats are value-typed either way. [`get_rowid`] and
//! [`get_size`] decode only the leading varints, allocation-free, for
//! the B-tree's binary searches.

use std::borrow::Cow;

use bumpalo::Bump;
use smallvec::SmallVec;

use crate::config::MAX_COLS;
use crate::encoding::bytes;
use crate::encoding::{decode_varint, encode_varint, varint_len};
use crate::error::{Error, Result};
use crate::records::serial::SerialType;
use crate::schema::{Column, ColumnType};

/// A runtime value: NULL, signed 64-bit integer, 64-bit float, UTF-8
/// text, or blob. Text and blobs borrow or own their bytes via `Cow`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Int(i64),
    Real(f64),
    Text(Cow<'a, str>),
    Blob(Cow<'a, [u8]>),
}

impl<'a> Value<'a> {
    /// Borrowing text constructor.
    pub fn text(s: &'a str) -> Self {
        Value::Text(Cow::Borrowed(s))
    }

    /// Borrowing blob constructor.
    pub fn blob(b: &'a [u8]) -> Self {
        Value::Blob(Cow::Borrowed(b))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Detaches the value from whatever buffer it borrows.
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Null => Value::Null,
            Value::Int(i) => Value::Int(i),
            Value::Real(f) => Value::Real(f),
            Value::Text(s) => Value::Text(Cow::Owned(s.into_owned())),
            Value::Blob(b) => Value::Blob(Cow::Owned(b.into_owned())),
        }
    }
}

/// One decoded record: the rowid and its values. The lifetime ties
/// borrowed text/blob bytes to their source (page buffer or arena).
#[derive(Debug, Clone, PartialEq)]
pub struct Cell<'a> {
    pub rowid: i64,
    pub values: Vec<Value<'a>>,
}

impl Cell<'_> {
    /// Deep-copies every borrowed value, detaching the cell from its
    /// source buffer.
    pub fn into_owned(self) -> Cell<'static> {
        Cell {
            rowid: self.rowid,
            values: self.values.into_iter().map(Value::into_owned).collect(),
        }
    }
}

type TypeVec = SmallVec<[SerialType; MAX_COLS]>;

fn measure(rowid: i64, types: &[SerialType]) -> (usize, usize, usize) {
    let header_size: usize = types.iter().map(|t| varint_len(t.code())).sum();
    let body_size: usize = types.iter().map(|t| t.stored_len()).sum();
    let payload_size =
        varint_len(rowid as u64) + varint_len(header_size as u64) + header_size + body_size;
    let total = varint_len(payload_size as u64) + payload_size;
    (header_size, payload_size, total)
}

/// Exact serialized size of `(rowid, values)`, including the outer
/// `payload_size` varint.
pub fn calculate_size(rowid: i64, values: &[Value<'_>]) -> usize {
    let types: TypeVec = values.iter().map(SerialType::for_value).collect();
    measure(rowid, &types).2
}

/// Serializes `(rowid, values)` into the front of `buf`, returning the
/// bytes written. Fails with [`Error::SerializationFailed`] if `buf` is
/// smaller than [`calculate_size`] reports.
pub fn serialize(buf: &mut [u8], rowid: i64, values: &[Value<'_>]) -> Result<usize> {
    let types: TypeVec = values.iter().map(SerialType::for_value).collect();
    let (header_size, payload_size, total) = measure(rowid, &types);

    if buf.len() < total {
        return Err(Error::SerializationFailed {
            reason: "buffer too small for cell",
        });
    }

    let mut pos = encode_varint(payload_size as u64, buf)?;
    pos += encode_varint(rowid as u64, &mut buf[pos..])?;
    pos += encode_varint(header_size as u64, &mut buf[pos..])?;
    for t in &types {
        pos += encode_varint(t.code(), &mut buf[pos..])?;
    }

    for (t, v) in types.iter().zip(values) {
        match (t, v) {
            (SerialType::Null | SerialType::Zero | SerialType::One, _) => {}
            (SerialType::Float, Value::Real(f)) => bytes::write_f64_be(buf, pos, *f)?,
            (SerialType::Text(len), Value::Text(s)) => {
                buf[pos..pos + len].copy_from_slice(s.as_bytes());
            }
            (SerialType::Blob(len), Value::Blob(b)) => {
                buf[pos..pos + len].copy_from_slice(b);
            }
            (t, Value::Int(i)) => {
                let width = t.int_width().ok_or(Error::SerializationFailed {
                    reason: "serial code does not match value",
                })?;
                bytes::write_int_le(buf, pos, *i, width)?;
            }
            _ => {
                return Err(Error::SerializationFailed {
                    reason: "serial code does not match value",
                });
            }
        }
        pos += t.stored_len();
    }

    debug_assert_eq!(pos, total);
    Ok(total)
}

/// Parsed framing of a cell: sizes verified, values not yet touched.
struct Frame {
    rowid: i64,
    types: TypeVec,
    body_start: usize,
    total_len: usize,
}

fn parse_frame(buf: &[u8], offset: usize) -> Result<Frame> {
    let fail = |reason: &'static str| Error::CellDeserializeFailed { offset, reason };

    if offset > buf.len() {
        return Err(fail("offset past end of buffer"));
    }
    let (payload_size, size_len) =
        decode_varint(&buf[offset..]).map_err(|_| fail("truncated payload size"))?;
    let payload_size = payload_size as usize;
    let payload_start = offset + size_len;
    let payload_end = payload_start
        .checked_add(payload_size)
        .ok_or_else(|| fail("payload size overflow"))?;
    if payload_end > buf.len() {
        return Err(fail("payload runs past buffer"));
    }
    let payload = &buf[payload_start..payload_end];

    let (rowid_bits, rowid_len) = decode_varint(payload).map_err(|_| fail("truncated rowid"))?;
    let (header_size, hsize_len) =
        decode_varint(&payload[rowid_len..]).map_err(|_| fail("truncated header size"))?;
    let header_start = rowid_len + hsize_len;
    let header_end = header_start
        .checked_add(header_size as usize)
        .filter(|&end| end <= payload.len())
        .ok_or_else(|| fail("record header runs past payload"))?;

    let mut types = TypeVec::new();
    let mut body_len = 0usize;
    let mut pos = header_start;
    while pos < header_end {
        let (code, code_len) = decode_varint(&payload[pos..header_end])
            .map_err(|_| fail("serial type crosses header boundary"))?;
        pos += code_len;
        let st = SerialType::from_code(code).map_err(|_| fail("bad serial code"))?;
        body_len += st.stored_len();
        types.push(st);
    }

    if header_end + body_len != payload.len() {
        return Err(fail("declared payload size does not match content"));
    }

    Ok(Frame {
        rowid: rowid_bits as i64,
        types,
        body_start: payload_start + header_end,
        total_len: size_len + payload_size,
    })
}

/// Decodes the cell at `offset`, borrowing text and blob bytes directly
/// from `buf`. Returns the cell and the bytes consumed.
pub fn deserialize_borrowed(buf: &[u8], offset: usize) -> Result<(Cell<'_>, usize)> {
    let frame = parse_frame(buf, offset)?;
    let mut values = Vec::with_capacity(frame.types.len());
    let mut pos = frame.body_start;
    for t in &frame.types {
        let value = match t {
            SerialType::Null => Value::Null,
            SerialType::Zero => Value::Int(0),
            SerialType::One => Value::Int(1),
            SerialType::Float => Value::Real(bytes::read_f64_be(buf, pos)?),
            SerialType::Text(len) => {
                let s = std::str::from_utf8(&buf[pos..pos + len]).map_err(|_| {
                    Error::CellDeserializeFailed {
                        offset,
                        reason: "text value is not valid UTF-8",
                    }
                })?;
                Value::Text(Cow::Borrowed(s))
            }
            SerialType::Blob(len) => Value::Blob(Cow::Borrowed(&buf[pos..pos + len])),
            t => {
                // Remaining codes are the six integer widths.
                let width = t.int_width().ok_or(Error::CellDeserializeFailed {
                    offset,
                    reason: "bad serial code",
                })?;
                Value::Int(bytes::read_int_le(buf, pos, width)?)
            }
        };
        pos += t.stored_len();
        values.push(value);
    }
    Ok((
        Cell {
            rowid: frame.rowid,
            values,
        },
        frame.total_len,
    ))
}

/// Decodes the cell at `offset`, deep-copying text and blob bytes into
/// `arena`. The returned cell borrows only from the arena.
pub fn deserialize_in<'b>(buf: &[u8], offset: usize, arena: &'b Bump) -> Result<(Cell<'b>, usize)> {
    let (cell, consumed) = deserialize_borrowed(buf, offset)?;
    let values = cell
        .values
        .into_iter()
        .map(|v| match v {
            Value::Text(s) => Value::Text(Cow::Borrowed(&*arena.alloc_str(&s))),
            Value::Blob(b) => Value::Blob(Cow::Borrowed(&*arena.alloc_slice_copy(&b))),
            Value::Null => Value::Null,
            Value::Int(i) => Value::Int(i),
            Value::Real(f) => Value::Real(f),
        })
        .collect();
    Ok((
        Cell {
            rowid: cell.rowid,
            values,
        },
        consumed,
    ))
}

/// Decodes only the rowid of the cell at `offset`. O(1), allocation
/// free.
pub fn get_rowid(buf: &[u8], offset: usize) -> Result<i64> {
    let fail = |reason: &'static str| Error::CellDeserializeFailed { offset, reason };
    if offset > buf.len() {
        return Err(fail("offset past end of buffer"));
    }
    let (_, size_len) = decode_varint(&buf[offset..]).map_err(|_| fail("truncated payload size"))?;
    let (rowid_bits, _) =
        decode_varint(&buf[offset + size_len..]).map_err(|_| fail("truncated rowid"))?;
    Ok(rowid_bits as i64)
}

/// Decodes only the total length of the cell at `offset`, including the
/// leading size varint. O(1), allocation free.
pub fn get_size(buf: &[u8], offset: usize) -> Result<usize> {
    let fail = |reason: &'static str| Error::CellDeserializeFailed { offset, reason };
    if offset > buf.len() {
        return Err(fail("offset past end of buffer"));
    }
    let (payload_size, size_len) =
        decode_varint(&buf[offset..]).map_err(|_| fail("truncated payload size"))?;
    let total = size_len
        .checked_add(payload_size as usize)
        .ok_or_else(|| fail("payload size overflow"))?;
    let end = offset
        .checked_add(total)
        .ok_or_else(|| fail("payload size overflow"))?;
    if end > buf.len() {
        return Err(fail("payload runs past buffer"));
    }
    Ok(total)
}

/// Checks `values` against a table's column list: arity, NOT NULL, and
/// type compatibility. INTEGER accepts only integers; REAL accepts
/// integers or floats; TEXT and BLOB accept either byte-carrying kind;
/// NULL satisfies any nullable column.
pub fn validate(values: &[Value<'_>], columns: &[Column]) -> Result<()> {
    if values.len() != columns.len() {
        return Err(Error::SerializationFailed {
            reason: "value count does not match table arity",
        });
    }
    for (value, column) in values.iter().zip(columns) {
        if value.is_null() {
            if column.not_null() {
                return Err(Error::SerializationFailed {
                    reason: "NOT NULL constraint violated",
                });
            }
            continue;
        }
        let compatible = match column.column_type() {
            ColumnType::Integer => matches!(value, Value::Int(_)),
            ColumnType::Real => matches!(value, Value::Int(_) | Value::Real(_)),
            ColumnType::Text | ColumnType::Blob => {
                matches!(value, Value::Text(_) | Value::Blob(_))
            }
        };
        if !compatible {
            return Err(Error::SerializationFailed {
                reason: "value type incompatible with column type",
            });
        }
    }
    Ok(())
}
