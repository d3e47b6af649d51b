//! # Serial Types
//!
//! Every stored value carries a serial code in the record header naming
//! its type and stored width:
//!
//! | Code | Stored width | Semantic |
//! |---|---|---|
//! | 0 | 0 | NULL |
//! | 1, 2, 3, 4 | 1, 2, 3, 4 | signed integer, width-specific |
//! | 5 | 6 | signed 48-bit integer |
//! | 6 | 8 | signed 64-bit integer |
//! | 7 | 8 | big-endian IEEE-754 double |
//! | 8 | 0 | integer literal 0 |
//! | 9 | 0 | integer literal 1 |
//! | even ≥ 12 | (code − 12) / 2 | blob of given length |
//! | odd ≥ 13 | (code − 13) / 2 | text of given length |
//!
//! Codes 10 and 11 are reserved and rejected on read. Integer encoding
//! picks the smallest width that fits the signed magnitude, with the
//! two literal shortcuts taking precedence.

use crate::error::{Error, Result};
use crate::records::Value;

/// Widest text/blob length representable without the code overflowing
/// sane bounds. Far beyond any cell that fits a page.
const MAX_PAYLOAD_LEN: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialType {
    Null,
    Int1,
    Int2,
    Int3,
    Int4,
    Int6,
    Int8,
    Float,
    Zero,
    One,
    Blob(usize),
    Text(usize),
}

impl SerialType {
    /// Decodes a serial code, rejecting the reserved codes 10 and 11.
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(SerialType::Null),
            1 => Ok(SerialType::Int1),
            2 => Ok(SerialType::Int2),
            3 => Ok(SerialType::Int3),
            4 => Ok(SerialType::Int4),
            5 => Ok(SerialType::Int6),
            6 => Ok(SerialType::Int8),
            7 => Ok(SerialType::Float),
            8 => Ok(SerialType::Zero),
            9 => Ok(SerialType::One),
            10 | 11 => Err(Error::CellDeserializeFailed {
                offset: 0,
                reason: "reserved serial code",
            }),
            _ => {
                let len = (code - 12) / 2;
                if len > MAX_PAYLOAD_LEN {
                    return Err(Error::CellDeserializeFailed {
                        offset: 0,
                        reason: "text/blob length too large",
                    });
                }
                if code % 2 == 0 {
                    Ok(SerialType::Blob(len as usize))
                } else {
                    Ok(SerialType::Text(len as usize))
                }
            }
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            SerialType::Null => 0,
            SerialType::Int1 => 1,
            SerialType::Int2 => 2,
            SerialType::Int3 => 3,
            SerialType::Int4 => 4,
            SerialType::Int6 => 5,
            SerialType::Int8 => 6,
            SerialType::Float => 7,
            SerialType::Zero => 8,
            SerialType::One => 9,
            SerialType::Blob(len) => 12 + 2 * *len as u64,
            SerialType::Text(len) => 13 + 2 * *len as u64,
        }
    }

    /// Bytes the value occupies in the record body.
    pub fn stored_len(&self) -> usize {
        match self {
            SerialType::Null | SerialType::Zero | SerialType::One => 0,
            SerialType::Int1 => 1,
            SerialType::Int2 => 2,
            SerialType::Int3 => 3,
            SerialType::Int4 => 4,
            SerialType::Int6 => 6,
            SerialType::Int8 | SerialType::Float => 8,
            SerialType::Blob(len) | SerialType::Text(len) => *len,
        }
    }

    /// Width for the integer codes, `None` otherwise.
    pub fn int_width(&self) -> Option<usize> {
        match self {
            SerialType::Int1 => Some(1),
            SerialType::Int2 => Some(2),
            SerialType::Int3 => Some(3),
            SerialType::Int4 => Some(4),
            SerialType::Int6 => Some(6),
            SerialType::Int8 => Some(8),
            _ => None,
        }
    }

    /// Picks the code for a runtime value: literal shortcuts first, then
    /// the smallest integer width that fits.
    pub fn for_value(value: &Value<'_>) -> Self {
        match value {
            Value::Null => SerialType::Null,
            Value::Int(0) => SerialType::Zero,
            Value::Int(1) => SerialType::One,
            Value::Int(i) => {
                let i = *i;
                if (-(1 << 7)..1 << 7).contains(&i) {
                    SerialType::Int1
                } else if (-(1 << 15)..1 << 15).contains(&i) {
                    SerialType::Int2
                } else if (-(1 << 23)..1 << 23).contains(&i) {
                    SerialType::Int3
                } else if (-(1 << 31)..1 << 31).contains(&i) {
                    SerialType::Int4
                } else if (-(1 << 47)..1 << 47).contains(&i) {
                    SerialType::Int6
                } else {
                    SerialType::Int8
                }
            }
            Value::Real(_) => SerialType::Float,
            Value::Text(s) => SerialType::Text(s.len()),
            Value::Blob(b) => SerialType::Blob(b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn code_roundtrip_scalar_types() {
        for code in [0u64, 1, 2, 3, 4, 5, 6, 7, 8, 9] {
            let st = SerialType::from_code(code).unwrap();
            assert_eq!(st.code(), code);
        }
    }

    #[test]
    fn reserved_codes_rejected() {
        assert!(SerialType::from_code(10).is_err());
        assert!(SerialType::from_code(11).is_err());
    }

    #[test]
    fn blob_even_text_odd() {
        assert_eq!(SerialType::from_code(12).unwrap(), SerialType::Blob(0));
        assert_eq!(SerialType::from_code(13).unwrap(), SerialType::Text(0));
        assert_eq!(SerialType::from_code(20).unwrap(), SerialType::Blob(4));
        assert_eq!(SerialType::from_code(21).unwrap(), SerialType::Text(4));

        assert_eq!(SerialType::Blob(4).code(), 20);
        assert_eq!(SerialType::Text(4).code(), 21);
    }

    #[test]
    fn stored_widths_match_table() {
        assert_eq!(SerialType::Null.stored_len(), 0);
        assert_eq!(SerialType::Int1.stored_len(), 1);
        assert_eq!(SerialType::Int6.stored_len(), 6);
        assert_eq!(SerialType::Int8.stored_len(), 8);
        assert_eq!(SerialType::Float.stored_len(), 8);
        assert_eq!(SerialType::Zero.stored_len(), 0);
        assert_eq!(SerialType::One.stored_len(), 0);
        assert_eq!(SerialType::Text(7).stored_len(), 7);
    }

    #[test]
    fn integer_width_selection() {
        let cases: &[(i64, SerialType)] = &[
            (0, SerialType::Zero),
            (1, SerialType::One),
            (-1, SerialType::Int1),
            (2, SerialType::Int1),
            (127, SerialType::Int1),
            (-128, SerialType::Int1),
            (128, SerialType::Int2),
            (-129, SerialType::Int2),
            (32_767, SerialType::Int2),
            (32_768, SerialType::Int3),
            (8_388_607, SerialType::Int3),
            (8_388_608, SerialType::Int4),
            (i32::MAX as i64, SerialType::Int4),
            (i32::MAX as i64 + 1, SerialType::Int6),
            ((1 << 47) - 1, SerialType::Int6),
            (1 << 47, SerialType::Int8),
            (i64::MAX, SerialType::Int8),
            (i64::MIN, SerialType::Int8),
        ];
        for &(value, expected) in cases {
            assert_eq!(
                SerialType::for_value(&Value::Int(value)),
                expected,
                "value {}",
                value
            );
        }
    }

    #[test]
    fn text_and_blob_lengths_drive_code() {
        let text = Value::Text(Cow::Borrowed("hello"));
        assert_eq!(SerialType::for_value(&text), SerialType::Text(5));

        let blob = Value::Blob(Cow::Borrowed(&[1u8, 2, 3][..]));
        assert_eq!(SerialType::for_value(&blob), SerialType::Blob(3));
    }
}
