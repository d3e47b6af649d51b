//! # Database File Header
//!
//! The first 100 bytes of page 1 identify the file and record its
//! geometry. Everything after byte 100 on page 1 belongs to the schema
//! tree's root node.
//!
//! ## Layout (100 bytes)
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  ----------------------------------
//! 0       13    magic           ASCII "MAGNI_DB_v1.0"
//! 13      4     page_size       u32 LE, must equal PAGE_SIZE
//! 17      4     page_count      u32 LE, total pages in file
//! 21      4     schema_version  u32 LE, currently 1
//! 25      75    reserved        zero-filled
//! ```
//!
//! The magic doubles as the record of the header-page convention: page 1
//! is the header page, valid data pages begin at 2, and there is no
//! page 0 on disk.
//!
//! ## Zero-Copy Access
//!
//! `DbHeader` transmutes directly from page bytes via `zerocopy`; every
//! field is an unaligned little-endian scalar so the struct has no
//! padding and no endianness surprises on any host.

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{DB_HEADER_SIZE, MAGIC, PAGE_SIZE, SCHEMA_VERSION};
use crate::error::{Error, Result};

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DbHeader {
    magic: [u8; 13],
    page_size: U32,
    page_count: U32,
    schema_version: U32,
    reserved: [u8; 75],
}

const _: () = assert!(size_of::<DbHeader>() == DB_HEADER_SIZE);

impl DbHeader {
    /// Header for a freshly initialized database: one page (the header
    /// page itself), current schema version.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            page_size: U32::new(PAGE_SIZE as u32),
            page_count: U32::new(1),
            schema_version: U32::new(SCHEMA_VERSION),
            reserved: [0u8; 75],
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_bytes(data.get(..DB_HEADER_SIZE).ok_or(Error::InvalidBounds {
            what: "database header",
            value: DB_HEADER_SIZE,
            limit: data.len(),
        })?)
        .map_err(|_| Error::InvalidPageHeader {
            page_num: 1,
            reason: "database header cast failed",
        })
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        let len = data.len();
        Self::mut_from_bytes(data.get_mut(..DB_HEADER_SIZE).ok_or(Error::InvalidBounds {
            what: "database header",
            value: DB_HEADER_SIZE,
            limit: len,
        })?)
        .map_err(|_| Error::InvalidPageHeader {
            page_num: 1,
            reason: "database header cast failed",
        })
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < DB_HEADER_SIZE {
            return Err(Error::InvalidBounds {
                what: "database header",
                value: DB_HEADER_SIZE,
                limit: data.len(),
            });
        }
        data[..DB_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    /// Checks magic, page size, and schema version against this build.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::InvalidPageHeader {
                page_num: 1,
                reason: "bad magic",
            });
        }
        if self.page_size.get() as usize != PAGE_SIZE {
            return Err(Error::InvalidPageHeader {
                page_num: 1,
                reason: "page size mismatch",
            });
        }
        if self.schema_version.get() != SCHEMA_VERSION {
            return Err(Error::InvalidPageHeader {
                page_num: 1,
                reason: "unsupported schema version",
            });
        }
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.get()
    }

    pub fn set_page_count(&mut self, count: u32) {
        self.page_count.set(count);
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version.get()
    }
}

impl Default for DbHeader {
    fn default() -> Self {
        Self::new()
    }
}
