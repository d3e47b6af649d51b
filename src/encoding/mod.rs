//! # Byte Codecs
//!
//! Endian-specific fixed-width reads and writes plus the variable-length
//! integer used for in-cell lengths and keys.
//!
//! The endianness split is deliberate and comes from the node layout
//! convention: node header fields and cell pointers are little-endian,
//! while child page pointers and stored doubles are big-endian.
//!
//! - [`bytes`]: fixed-width integers and floats, and the sign-extending
//!   reads for the 1/2/3/4/6/8-byte serial integer widths
//! - [`varint`]: little-endian 7-bit continuation varint, 1 to 9 bytes

pub mod bytes;
pub mod varint;

pub use varint::{decode_varint, encode_varint, varint_len};
