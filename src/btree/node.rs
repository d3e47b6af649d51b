//! # Node Page Layout
//!
//! Leaf and interior pages share an 8-byte common header and a 4-byte
//! type-specific extension, followed by the cell pointer array. Cell
//! content grows downward from the high end of the page.
//!
//! ## Common Header (8 bytes, little-endian)
//!
//! ```text
//! Offset  Size  Field                Description
//! ------  ----  -------------------  -------------------------------
//! 0       1     page_type            5 = interior, 13 = leaf
//! 1       2     first_freeblock      reserved, 0
//! 3       2     cell_count           cells on this page
//! 5       2     cell_content_offset  low edge of the content region
//! 7       1     fragmented_bytes     reclaimable bytes, saturates at 255
//! ```
//!
//! ## Extension (4 bytes, big-endian)
//!
//! - Interior: `rightmost_child_page: u32`
//! - Leaf: `next_leaf_page: u32` (0 if none)
//!
//! ## Header Placement
//!
//! The node header sits at offset 0 on every page except page 1, where
//! it begins at offset 100 to leave room for the database header. Cell
//! content offsets are absolute page offsets either way, so cells can
//! be copied between pages verbatim.
//!
//! ## Page Layout
//!
//! ```text
//! +---------------------------+  <- header_offset (0, or 100 on page 1)
//! | Common header (8 bytes)   |
//! +---------------------------+
//! | Extension (4 bytes)       |
//! +---------------------------+
//! | Cell pointer array        |  u16 LE offsets, sorted by key,
//! | (2 bytes per cell)        |  grows upward
//! +---------------------------+
//! | Free space                |
//! +---------------------------+  <- cell_content_offset
//! | Cell content              |  grows downward from page end
//! +---------------------------+  <- PAGE_SIZE
//! ```
//!
//! ## Cell Shapes
//!
//! - Leaf cells are full records (see [`crate::records`]).
//! - Interior cells are `child_page: u32 BE ‖ varint(separator)`. The
//!   separator bounds the child subtree from above: every key reachable
//!   through `child_page` is `≤ separator`.
//!
//! ## View Types
//!
//! [`LeafNode`]/[`InteriorNode`] are read-only views borrowing page
//! bytes; [`LeafNodeMut`]/[`InteriorNodeMut`] add in-place insertion
//! and deletion. Construction validates the page type and the header's
//! internal consistency, so accessor paths are cheap.

use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    BTREE_HEADER_SIZE, BTREE_NODE_HEADER_SIZE, CELL_POINTER_SIZE, DB_HEADER_SIZE, PAGE_SIZE,
    SCHEMA_ROOT_PAGE,
};
use crate::encoding::{bytes, decode_varint, encode_varint, varint_len};
use crate::error::{Error, Result};
use crate::records;

/// Byte offset of the node header within a page.
pub fn header_offset(page_num: u32) -> usize {
    if page_num == SCHEMA_ROOT_PAGE {
        DB_HEADER_SIZE
    } else {
        0
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Interior = 5,
    Leaf = 13,
}

impl PageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            5 => Some(PageType::Interior),
            13 => Some(PageType::Leaf),
            _ => None,
        }
    }
}

/// Reads the node type of a page without building a full view.
pub fn page_type(data: &[u8], page_num: u32) -> Result<PageType> {
    let base = header_offset(page_num);
    let byte = *data.get(base).ok_or(Error::InvalidPageHeader {
        page_num,
        reason: "node header out of range",
    })?;
    PageType::from_byte(byte).ok_or(Error::InvalidPageHeader {
        page_num,
        reason: "unknown page type",
    })
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct NodeHeader {
    page_type: u8,
    first_freeblock: U16,
    cell_count: U16,
    cell_content_offset: U16,
    frag_bytes: u8,
}

const _: () = assert!(size_of::<NodeHeader>() == BTREE_HEADER_SIZE);

fn header<'a>(data: &'a [u8], base: usize, page_num: u32) -> Result<&'a NodeHeader> {
    let slice = data
        .get(base..base + BTREE_HEADER_SIZE)
        .ok_or(Error::InvalidPageHeader {
            page_num,
            reason: "node header out of range",
        })?;
    NodeHeader::ref_from_bytes(slice).map_err(|_| Error::InvalidPageHeader {
        page_num,
        reason: "node header cast failed",
    })
}

fn header_mut<'a>(data: &'a mut [u8], base: usize, page_num: u32) -> Result<&'a mut NodeHeader> {
    let slice = data
        .get_mut(base..base + BTREE_HEADER_SIZE)
        .ok_or(Error::InvalidPageHeader {
            page_num,
            reason: "node header out of range",
        })?;
    NodeHeader::mut_from_bytes(slice).map_err(|_| Error::InvalidPageHeader {
        page_num,
        reason: "node header cast failed",
    })
}

/// Validates size, type, and header consistency; returns the decoded
/// `(cell_count, cell_content_offset)`.
fn validate_node(
    data: &[u8],
    page_num: u32,
    expected: PageType,
) -> Result<(usize, usize)> {
    if data.len() != PAGE_SIZE {
        return Err(Error::InvalidBounds {
            what: "node page",
            value: data.len(),
            limit: PAGE_SIZE,
        });
    }
    let base = header_offset(page_num);
    let h = header(data, base, page_num)?;
    if h.page_type != expected as u8 {
        return Err(Error::InvalidPageHeader {
            page_num,
            reason: match expected {
                PageType::Leaf => "expected leaf page",
                PageType::Interior => "expected interior page",
            },
        });
    }
    let count = h.cell_count.get() as usize;
    let content_offset = h.cell_content_offset.get() as usize;
    let header_end = base + BTREE_NODE_HEADER_SIZE;
    if content_offset > PAGE_SIZE || content_offset < header_end + CELL_POINTER_SIZE * count {
        return Err(Error::InvalidPageHeader {
            page_num,
            reason: "cell content offset overlaps pointer array",
        });
    }
    Ok((count, content_offset))
}

fn init_node(data: &mut [u8], page_num: u32, page_type: PageType) -> Result<()> {
    if data.len() != PAGE_SIZE {
        return Err(Error::InvalidBounds {
            what: "node page",
            value: data.len(),
            limit: PAGE_SIZE,
        });
    }
    let base = header_offset(page_num);
    let h = header_mut(data, base, page_num)?;
    h.page_type = page_type as u8;
    h.first_freeblock = U16::new(0);
    h.cell_count = U16::new(0);
    h.cell_content_offset = U16::new(PAGE_SIZE as u16);
    h.frag_bytes = 0;
    bytes::write_u32_be(data, base + BTREE_HEADER_SIZE, 0)?;
    Ok(())
}

/// Outcome of a key search within one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    /// Key present at this cell index.
    Found(usize),
    /// Key absent; this is its insertion index.
    NotFound(usize),
}

// ============================================================================
// LEAF VIEWS
// ============================================================================

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
    page_num: u32,
    base: usize,
    count: usize,
    content_offset: usize,
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8], page_num: u32) -> Result<Self> {
        let (count, content_offset) = validate_node(data, page_num, PageType::Leaf)?;
        Ok(Self {
            data,
            page_num,
            base: header_offset(page_num),
            count,
            content_offset,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.count
    }

    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    pub fn frag_bytes(&self) -> u8 {
        // Construction validated the header range.
        header(self.data, self.base, self.page_num)
            .map(|h| h.frag_bytes)
            .unwrap_or(0)
    }

    pub fn next_leaf(&self) -> Result<u32> {
        bytes::read_u32_be(self.data, self.base + BTREE_HEADER_SIZE)
    }

    fn pointer_array_start(&self) -> usize {
        self.base + BTREE_NODE_HEADER_SIZE
    }

    pub fn cell_pointer(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(Error::InvalidBounds {
                what: "cell index",
                value: index,
                limit: self.count,
            });
        }
        let offset =
            bytes::read_u16_le(self.data, self.pointer_array_start() + CELL_POINTER_SIZE * index)?
                as usize;
        if offset < self.content_offset || offset >= PAGE_SIZE {
            return Err(Error::InvalidCellPointer {
                page_num: self.page_num,
                index,
                offset,
            });
        }
        Ok(offset)
    }

    pub fn rowid_at(&self, index: usize) -> Result<i64> {
        let offset = self.cell_pointer(index)?;
        records::get_rowid(self.data, offset)
    }

    pub fn cell_len_at(&self, index: usize) -> Result<usize> {
        let offset = self.cell_pointer(index)?;
        records::get_size(self.data, offset)
    }

    pub fn cell_bytes_at(&self, index: usize) -> Result<&'a [u8]> {
        let offset = self.cell_pointer(index)?;
        let len = records::get_size(self.data, offset)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Binary search for `rowid` over the pointer array.
    pub fn search(&self, rowid: i64) -> Result<SearchResult> {
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = self.rowid_at(mid)?;
            match probe.cmp(&rowid) {
                std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(SearchResult::NotFound(lo))
    }

    /// Whether a cell of `cell_size` bytes fits alongside one more
    /// pointer slot.
    pub fn can_fit(&self, cell_size: usize) -> bool {
        let header_end = self.base + BTREE_NODE_HEADER_SIZE;
        header_end + CELL_POINTER_SIZE * (self.count + 1) + cell_size <= self.content_offset
    }
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
    page_num: u32,
    base: usize,
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8], page_num: u32) -> Result<Self> {
        validate_node(data, page_num, PageType::Leaf)?;
        Ok(Self {
            data,
            page_num,
            base: header_offset(page_num),
        })
    }

    /// Resets the page to an empty leaf.
    pub fn init(data: &'a mut [u8], page_num: u32) -> Result<Self> {
        init_node(data, page_num, PageType::Leaf)?;
        Ok(Self {
            data,
            page_num,
            base: header_offset(page_num),
        })
    }

    /// Read-only view of the current state.
    pub fn as_read(&self) -> Result<LeafNode<'_>> {
        LeafNode::from_page(self.data, self.page_num)
    }

    pub fn cell_count(&self) -> Result<usize> {
        Ok(header(self.data, self.base, self.page_num)?.cell_count.get() as usize)
    }

    fn content_offset(&self) -> Result<usize> {
        Ok(header(self.data, self.base, self.page_num)?
            .cell_content_offset
            .get() as usize)
    }

    pub fn set_next_leaf(&mut self, page: u32) -> Result<()> {
        bytes::write_u32_be(self.data, self.base + BTREE_HEADER_SIZE, page)
    }

    pub fn next_leaf(&self) -> Result<u32> {
        bytes::read_u32_be(self.data, self.base + BTREE_HEADER_SIZE)
    }

    fn pointer_array_start(&self) -> usize {
        self.base + BTREE_NODE_HEADER_SIZE
    }

    /// Reserves `size` bytes in the content region for a cell at
    /// `index`, shifting the pointer array. Returns the cell's offset.
    fn open_slot(&mut self, index: usize, size: usize) -> Result<usize> {
        let count = self.cell_count()?;
        let content_offset = self.content_offset()?;
        if index > count {
            return Err(Error::InvalidBounds {
                what: "cell index",
                value: index,
                limit: count,
            });
        }

        let header_end = self.base + BTREE_NODE_HEADER_SIZE;
        let needed = CELL_POINTER_SIZE * (count + 1) + size;
        if header_end + needed > content_offset {
            return Err(Error::PageFull {
                page_num: self.page_num,
                needed: size + CELL_POINTER_SIZE,
                available: content_offset.saturating_sub(header_end + CELL_POINTER_SIZE * count),
            });
        }

        let start = content_offset - size;

        // Shift pointers [index, count) one slot right; the raw array
        // extends one slot past the live region.
        let ptrs = self.pointer_array_start();
        self.data.copy_within(
            ptrs + CELL_POINTER_SIZE * index..ptrs + CELL_POINTER_SIZE * count,
            ptrs + CELL_POINTER_SIZE * (index + 1),
        );
        bytes::write_u16_le(self.data, ptrs + CELL_POINTER_SIZE * index, start as u16)?;

        let h = header_mut(self.data, self.base, self.page_num)?;
        h.cell_count = U16::new((count + 1) as u16);
        h.cell_content_offset = U16::new(start as u16);
        Ok(start)
    }

    /// Serializes `(rowid, values)` directly into the content region.
    pub fn insert_values(
        &mut self,
        index: usize,
        rowid: i64,
        values: &[crate::records::Value<'_>],
    ) -> Result<()> {
        let size = records::calculate_size(rowid, values);
        let start = self.open_slot(index, size)?;
        records::serialize(&mut self.data[start..start + size], rowid, values)?;
        Ok(())
    }

    /// Copies an already-serialized cell into the content region. Used
    /// by splits and root growth.
    pub fn insert_raw(&mut self, index: usize, cell: &[u8]) -> Result<()> {
        let start = self.open_slot(index, cell.len())?;
        self.data[start..start + cell.len()].copy_from_slice(cell);
        Ok(())
    }

    /// Removes the cell at `index`, reclaiming its bytes when it is the
    /// last physically written cell and otherwise counting them as
    /// fragmentation (saturating at 255).
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let view = self.as_read()?;
        let count = view.cell_count();
        let offset = view.cell_pointer(index)?;
        let len = view.cell_len_at(index)?;
        let content_offset = view.content_offset();

        let ptrs = self.pointer_array_start();
        self.data.copy_within(
            ptrs + CELL_POINTER_SIZE * (index + 1)..ptrs + CELL_POINTER_SIZE * count,
            ptrs + CELL_POINTER_SIZE * index,
        );

        let h = header_mut(self.data, self.base, self.page_num)?;
        h.cell_count = U16::new((count - 1) as u16);
        if offset == content_offset {
            h.cell_content_offset = U16::new((content_offset + len) as u16);
        } else {
            h.frag_bytes = (h.frag_bytes as usize + len).min(255) as u8;
        }
        Ok(())
    }
}

// ============================================================================
// INTERIOR VIEWS
// ============================================================================

#[derive(Debug)]
pub struct InteriorNode<'a> {
    data: &'a [u8],
    page_num: u32,
    base: usize,
    count: usize,
    content_offset: usize,
}

impl<'a> InteriorNode<'a> {
    pub fn from_page(data: &'a [u8], page_num: u32) -> Result<Self> {
        let (count, content_offset) = validate_node(data, page_num, PageType::Interior)?;
        Ok(Self {
            data,
            page_num,
            base: header_offset(page_num),
            count,
            content_offset,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.count
    }

    pub fn rightmost_child(&self) -> Result<u32> {
        bytes::read_u32_be(self.data, self.base + BTREE_HEADER_SIZE)
    }

    fn pointer_array_start(&self) -> usize {
        self.base + BTREE_NODE_HEADER_SIZE
    }

    pub fn cell_pointer(&self, index: usize) -> Result<usize> {
        if index >= self.count {
            return Err(Error::InvalidBounds {
                what: "cell index",
                value: index,
                limit: self.count,
            });
        }
        let offset =
            bytes::read_u16_le(self.data, self.pointer_array_start() + CELL_POINTER_SIZE * index)?
                as usize;
        if offset < self.content_offset || offset >= PAGE_SIZE {
            return Err(Error::InvalidCellPointer {
                page_num: self.page_num,
                index,
                offset,
            });
        }
        Ok(offset)
    }

    /// The `(child_page, separator)` pair at `index`.
    pub fn cell_at(&self, index: usize) -> Result<(u32, i64)> {
        let offset = self.cell_pointer(index)?;
        let child = bytes::read_u32_be(self.data, offset)?;
        let (bits, _) =
            decode_varint(&self.data[offset + 4..]).map_err(|_| Error::InvalidPageHeader {
                page_num: self.page_num,
                reason: "truncated separator key",
            })?;
        Ok((child, bits as i64))
    }

    pub fn separator_at(&self, index: usize) -> Result<i64> {
        Ok(self.cell_at(index)?.1)
    }

    /// Binary search over separators.
    pub fn search(&self, key: i64) -> Result<SearchResult> {
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let probe = self.separator_at(mid)?;
            match probe.cmp(&key) {
                std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
            }
        }
        Ok(SearchResult::NotFound(lo))
    }

    /// Index of the cell whose subtree may contain `key`: the first
    /// cell with separator ≥ key, or `cell_count()` for the rightmost
    /// child.
    pub fn child_index(&self, key: i64) -> Result<usize> {
        Ok(match self.search(key)? {
            SearchResult::Found(i) => i,
            SearchResult::NotFound(i) => i,
        })
    }

    /// The child page to descend into for `key`, plus its cell index
    /// (`cell_count()` means the rightmost child).
    pub fn find_child(&self, key: i64) -> Result<(u32, usize)> {
        let index = self.child_index(key)?;
        let child = if index == self.count {
            self.rightmost_child()?
        } else {
            self.cell_at(index)?.0
        };
        if child == 0 {
            return Err(Error::InvalidPageHeader {
                page_num: self.page_num,
                reason: "child pointer is zero",
            });
        }
        Ok((child, index))
    }

    pub fn can_fit(&self, cell_size: usize) -> bool {
        let header_end = self.base + BTREE_NODE_HEADER_SIZE;
        header_end + CELL_POINTER_SIZE * (self.count + 1) + cell_size <= self.content_offset
    }
}

pub struct InteriorNodeMut<'a> {
    data: &'a mut [u8],
    page_num: u32,
    base: usize,
}

impl<'a> InteriorNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8], page_num: u32) -> Result<Self> {
        validate_node(data, page_num, PageType::Interior)?;
        Ok(Self {
            data,
            page_num,
            base: header_offset(page_num),
        })
    }

    /// Resets the page to an empty interior node with the given
    /// rightmost child.
    pub fn init(data: &'a mut [u8], page_num: u32, rightmost_child: u32) -> Result<Self> {
        init_node(data, page_num, PageType::Interior)?;
        let base = header_offset(page_num);
        bytes::write_u32_be(data, base + BTREE_HEADER_SIZE, rightmost_child)?;
        Ok(Self {
            data,
            page_num,
            base,
        })
    }

    pub fn as_read(&self) -> Result<InteriorNode<'_>> {
        InteriorNode::from_page(self.data, self.page_num)
    }

    pub fn cell_count(&self) -> Result<usize> {
        Ok(header(self.data, self.base, self.page_num)?.cell_count.get() as usize)
    }

    fn content_offset(&self) -> Result<usize> {
        Ok(header(self.data, self.base, self.page_num)?
            .cell_content_offset
            .get() as usize)
    }

    pub fn set_rightmost_child(&mut self, page: u32) -> Result<()> {
        bytes::write_u32_be(self.data, self.base + BTREE_HEADER_SIZE, page)
    }

    /// Rewrites the child pointer of an existing cell in place. The
    /// separator length is untouched, so no bytes move.
    pub fn set_cell_child(&mut self, index: usize, child: u32) -> Result<()> {
        let offset = self.as_read()?.cell_pointer(index)?;
        bytes::write_u32_be(self.data, offset, child)
    }

    /// Inserts a `(child_page, separator)` cell at `index`.
    pub fn insert_cell(&mut self, index: usize, child: u32, separator: i64) -> Result<()> {
        let count = self.cell_count()?;
        let content_offset = self.content_offset()?;
        if index > count {
            return Err(Error::InvalidBounds {
                what: "cell index",
                value: index,
                limit: count,
            });
        }

        let size = 4 + varint_len(separator as u64);
        let header_end = self.base + BTREE_NODE_HEADER_SIZE;
        if header_end + CELL_POINTER_SIZE * (count + 1) + size > content_offset {
            return Err(Error::PageFull {
                page_num: self.page_num,
                needed: size + CELL_POINTER_SIZE,
                available: content_offset
                    .saturating_sub(header_end + CELL_POINTER_SIZE * count),
            });
        }

        let start = content_offset - size;
        bytes::write_u32_be(self.data, start, child)?;
        encode_varint(separator as u64, &mut self.data[start + 4..start + size])?;

        let ptrs = self.base + BTREE_NODE_HEADER_SIZE;
        self.data.copy_within(
            ptrs + CELL_POINTER_SIZE * index..ptrs + CELL_POINTER_SIZE * count,
            ptrs + CELL_POINTER_SIZE * (index + 1),
        );
        bytes::write_u16_le(self.data, ptrs + CELL_POINTER_SIZE * index, start as u16)?;

        let h = header_mut(self.data, self.base, self.page_num)?;
        h.cell_count = U16::new((count + 1) as u16);
        h.cell_content_offset = U16::new(start as u16);
        Ok(())
    }
}
