//! # Record Serialization Layer
//!
//! Rows are stored as variable-length cells: a rowid, a header of
//! per-column serial codes, and the value bytes. The layer provides
//! size prediction, serialization into page buffers, two decode paths
//! with statically distinct ownership (borrow the page, or deep-copy
//! into an arena), and allocation-free rowid/size probes for binary
//! search.
//!
//! - [`cell`]: the [`Cell`]/[`Value`] types and the codec itself
//! - [`serial`]: the serial-code table and width selection

pub mod cell;
pub mod serial;


pub use cell::{
    calculate_size, deserialize_borrowed, deserialize_in, get_rowid, get_size, serialize,
    validate, Cell, Value,
};
pub use serial::SerialType;
