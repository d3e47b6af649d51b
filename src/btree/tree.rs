//! # B+Tree
//!
//! A disk-resident ordered index keyed by rowid. All records live in
//! leaf pages; interior pages hold `(child, separator)` routing cells.
//! Leaves are linked left-to-right for ordered scans. One tree is
//! identified by its root page number; the same layout serves the
//! schema catalog and every user table.
//!
//! ## Descent
//!
//! At an interior node, binary-search the separators for the first one
//! `≥ key` and follow its child, falling back to the rightmost child.
//! A separator bounds its child subtree from above, so the key either
//! lives in that subtree or nowhere.
//!
//! ## Insert and Splits
//!
//! ```text
//! 1. Recurse to the leaf that owns the key.
//! 2. If the cell fits: place it, done.
//! 3. Otherwise split: redistribute the leaf's cells together with the
//!    incoming one, moving the upper half to a fresh right sibling, and
//!    hand (right_page, separator) to the parent.
//! 4. The parent re-points the routing cell of the split child at the
//!    right page and inserts (left_child, separator) before it; if the
//!    parent overflows it splits the same way, promoting its middle
//!    separator.
//! 5. A split of the root grows the tree: the root's content moves to a
//!    fresh left child and the root is re-initialized as a two-way
//!    interior node. The root page number never changes.
//! ```
//!
//! ## Delete
//!
//! Deletion removes the cell from its leaf and never rebalances.
//! Under-full leaves persist; the ordering invariants still hold, and
//! space is accounted in `fragmented_bytes` (advisory, saturating).
//!
//! ## Verification
//!
//! [`BTree::verify`] walks the tree top-down, checking key ordering
//! within each node and the `(min, max]` bounds induced by separators.
//! Violations surface as [`Error::InvalidPageHeader`], the same kind
//! descent reports when it trips over corruption.

use bumpalo::Bump;
use tracing::trace;

use crate::btree::node::{
    self, InteriorNode, InteriorNodeMut, LeafNode, LeafNodeMut, PageType, SearchResult,
};
use crate::config::MAX_CELL_SIZE;
use crate::encoding::varint_len;
use crate::error::{Error, Result};
use crate::records::{self, Cell, Value};
use crate::storage::Pager;

/// Upper bound on root-to-leaf descent; a healthy tree over a 32-bit
/// page space is far shallower. Tripping it means a cycle.
pub(crate) const MAX_DEPTH: usize = 32;

pub struct BTree<'p> {
    pager: &'p Pager,
    root_page: u32,
    check_duplicates: bool,
}

enum InsertOutcome {
    Done,
    Split { right_page: u32, separator: i64 },
}

impl<'p> BTree<'p> {
    /// Opens an existing tree rooted at `root_page`.
    pub fn open(pager: &'p Pager, root_page: u32) -> Result<Self> {
        if root_page == 0 {
            return Err(Error::InvalidPageNum {
                page_num: root_page,
            });
        }
        let page_count = pager.page_count();
        if root_page > page_count {
            return Err(Error::PageNotFound {
                page_num: root_page,
                page_count,
            });
        }
        Ok(Self {
            pager,
            root_page,
            check_duplicates: true,
        })
    }

    /// Allocates a fresh root page and initializes it as an empty leaf.
    pub fn create(pager: &'p Pager) -> Result<Self> {
        let mut guard = pager.allocate_page()?;
        let root_page = guard.page_num();
        LeafNodeMut::init(guard.data_mut(), root_page)?;
        drop(guard);
        trace!(root = root_page, "created tree");
        Ok(Self {
            pager,
            root_page,
            check_duplicates: true,
        })
    }

    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    pub fn pager(&self) -> &'p Pager {
        self.pager
    }

    /// When false, inserting an existing rowid places a second cell
    /// instead of failing; the per-tree uniqueness invariant is waived
    /// by the caller.
    pub fn set_check_duplicates(&mut self, check: bool) {
        self.check_duplicates = check;
    }

    pub fn check_duplicates(&self) -> bool {
        self.check_duplicates
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Walks to the leaf cell holding `rowid`. Returns the leaf page
    /// and the cell index, or [`Error::CellNotFound`].
    fn locate(&self, rowid: i64) -> Result<(u32, usize)> {
        let mut page_num = self.root_page;
        for _ in 0..MAX_DEPTH {
            let guard = self.pager.get_page(page_num)?;
            match node::page_type(guard.data(), page_num)? {
                PageType::Interior => {
                    let interior = InteriorNode::from_page(guard.data(), page_num)?;
                    let (child, _) = interior.find_child(rowid)?;
                    page_num = child;
                }
                PageType::Leaf => {
                    let leaf = LeafNode::from_page(guard.data(), page_num)?;
                    return match leaf.search(rowid)? {
                        SearchResult::Found(index) => Ok((page_num, index)),
                        SearchResult::NotFound(_) => Err(Error::CellNotFound { rowid }),
                    };
                }
            }
        }
        Err(Error::InvalidPageHeader {
            page_num: self.root_page,
            reason: "descent deeper than maximum tree height",
        })
    }

    /// Point lookup, deep-copying the cell's values into `arena`.
    pub fn find<'b>(&self, rowid: i64, arena: &'b Bump) -> Result<Cell<'b>> {
        let (page_num, index) = self.locate(rowid)?;
        let guard = self.pager.get_page(page_num)?;
        let leaf = LeafNode::from_page(guard.data(), page_num)?;
        let offset = leaf.cell_pointer(index)?;
        let (cell, _) = records::deserialize_in(guard.data(), offset, arena)?;
        Ok(cell)
    }

    /// Point lookup without copying: the closure receives a cell whose
    /// text and blob values borrow the pinned page buffer. The page
    /// stays pinned exactly for the closure's duration.
    pub fn find_zero_copy<R>(&self, rowid: i64, f: impl FnOnce(&Cell<'_>) -> R) -> Result<R> {
        let (page_num, index) = self.locate(rowid)?;
        let guard = self.pager.get_page(page_num)?;
        let leaf = LeafNode::from_page(guard.data(), page_num)?;
        let offset = leaf.cell_pointer(index)?;
        let (cell, _) = records::deserialize_borrowed(guard.data(), offset)?;
        Ok(f(&cell))
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Inserts `(rowid, values)`, splitting as needed.
    pub fn insert(&self, rowid: i64, values: &[Value<'_>]) -> Result<()> {
        let size = records::calculate_size(rowid, values);
        if size > MAX_CELL_SIZE {
            return Err(Error::InvalidBounds {
                what: "cell size",
                value: size,
                limit: MAX_CELL_SIZE,
            });
        }

        match self.insert_rec(self.root_page, rowid, values, 0)? {
            InsertOutcome::Done => Ok(()),
            InsertOutcome::Split {
                right_page,
                separator,
            } => self.grow_root(right_page, separator),
        }
    }

    fn insert_rec(
        &self,
        page_num: u32,
        rowid: i64,
        values: &[Value<'_>],
        depth: usize,
    ) -> Result<InsertOutcome> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidPageHeader {
                page_num,
                reason: "descent deeper than maximum tree height",
            });
        }

        let guard = self.pager.get_page(page_num)?;
        match node::page_type(guard.data(), page_num)? {
            PageType::Leaf => {
                drop(guard);
                self.insert_into_leaf(page_num, rowid, values)
            }
            PageType::Interior => {
                let (child, child_index) =
                    InteriorNode::from_page(guard.data(), page_num)?.find_child(rowid)?;
                drop(guard);

                match self.insert_rec(child, rowid, values, depth + 1)? {
                    InsertOutcome::Done => Ok(InsertOutcome::Done),
                    InsertOutcome::Split {
                        right_page,
                        separator,
                    } => self.insert_into_interior(
                        page_num,
                        child_index,
                        child,
                        right_page,
                        separator,
                    ),
                }
            }
        }
    }

    fn insert_into_leaf(
        &self,
        page_num: u32,
        rowid: i64,
        values: &[Value<'_>],
    ) -> Result<InsertOutcome> {
        let size = records::calculate_size(rowid, values);

        let mut guard = self.pager.get_page(page_num)?;
        let (index, fits) = {
            let leaf = LeafNode::from_page(guard.data(), page_num)?;
            let index = match leaf.search(rowid)? {
                SearchResult::Found(index) => {
                    if self.check_duplicates {
                        return Err(Error::DuplicateRowid { rowid });
                    }
                    index
                }
                SearchResult::NotFound(index) => index,
            };
            (index, leaf.can_fit(size))
        };

        if fits {
            let mut leaf = LeafNodeMut::from_page(guard.data_mut(), page_num)?;
            leaf.insert_values(index, rowid, values)?;
            return Ok(InsertOutcome::Done);
        }

        drop(guard);
        self.split_leaf(page_num, index, rowid, values)
    }

    /// Splits a full leaf, folding the pending cell into the
    /// redistribution: the upper half of the cells (by count) moves to
    /// a fresh right sibling, the left page is rewritten contiguously,
    /// and the leaf list is spliced.
    fn split_leaf(
        &self,
        page_num: u32,
        insert_index: usize,
        rowid: i64,
        values: &[Value<'_>],
    ) -> Result<InsertOutcome> {
        let (mut cells, old_next) = {
            let guard = self.pager.get_page(page_num)?;
            let leaf = LeafNode::from_page(guard.data(), page_num)?;
            let mut cells = Vec::with_capacity(leaf.cell_count() + 1);
            for i in 0..leaf.cell_count() {
                cells.push(leaf.cell_bytes_at(i)?.to_vec());
            }
            (cells, leaf.next_leaf()?)
        };

        let size = records::calculate_size(rowid, values);
        let mut new_cell = vec![0u8; size];
        records::serialize(&mut new_cell, rowid, values)?;
        cells.insert(insert_index, new_cell);

        // The upper ⌈old_count/2⌉ cells migrate to the right sibling.
        let old_count = cells.len() - 1;
        let move_count = old_count.div_ceil(2).max(1);
        let split_at = cells.len() - move_count;
        let separator = records::get_rowid(&cells[split_at - 1], 0)?;

        let right_page = {
            let mut right_guard = self.pager.allocate_page()?;
            let right_num = right_guard.page_num();
            let mut right = LeafNodeMut::init(right_guard.data_mut(), right_num)?;
            for (i, cell) in cells[split_at..].iter().enumerate() {
                right.insert_raw(i, cell)?;
            }
            right.set_next_leaf(old_next)?;
            right_num
        };

        {
            let mut left_guard = self.pager.get_page(page_num)?;
            let mut left = LeafNodeMut::init(left_guard.data_mut(), page_num)?;
            for (i, cell) in cells[..split_at].iter().enumerate() {
                left.insert_raw(i, cell)?;
            }
            left.set_next_leaf(right_page)?;
        }

        trace!(
            left = page_num,
            right = right_page,
            separator,
            "split leaf"
        );
        Ok(InsertOutcome::Split {
            right_page,
            separator,
        })
    }

    /// Applies a child split to its parent: the cell (or rightmost
    /// pointer) that routed to the split child now routes to the new
    /// right page, and a fresh `(left_child, separator)` cell lands
    /// just before it.
    fn insert_into_interior(
        &self,
        page_num: u32,
        child_index: usize,
        split_child: u32,
        right_page: u32,
        separator: i64,
    ) -> Result<InsertOutcome> {
        let cell_size = 4 + varint_len(separator as u64);

        let mut guard = self.pager.get_page(page_num)?;
        let (count, fits) = {
            let interior = InteriorNode::from_page(guard.data(), page_num)?;
            (interior.cell_count(), interior.can_fit(cell_size))
        };

        if fits {
            let mut interior = InteriorNodeMut::from_page(guard.data_mut(), page_num)?;
            if child_index == count {
                interior.insert_cell(count, split_child, separator)?;
                interior.set_rightmost_child(right_page)?;
            } else {
                interior.set_cell_child(child_index, right_page)?;
                interior.insert_cell(child_index, split_child, separator)?;
            }
            return Ok(InsertOutcome::Done);
        }

        drop(guard);
        self.split_interior(page_num, child_index, split_child, right_page, separator)
    }

    /// Splits a full interior node. The middle cell's separator is
    /// promoted: its child becomes the left half's rightmost child, the
    /// cells above it move to the new right page, and the original
    /// rightmost child becomes the right page's rightmost child.
    fn split_interior(
        &self,
        page_num: u32,
        child_index: usize,
        split_child: u32,
        right_page: u32,
        separator: i64,
    ) -> Result<InsertOutcome> {
        let (mut entries, mut rightmost) = {
            let guard = self.pager.get_page(page_num)?;
            let interior = InteriorNode::from_page(guard.data(), page_num)?;
            let mut entries = Vec::with_capacity(interior.cell_count() + 1);
            for i in 0..interior.cell_count() {
                entries.push(interior.cell_at(i)?);
            }
            (entries, interior.rightmost_child()?)
        };

        if child_index == entries.len() {
            entries.push((split_child, separator));
            rightmost = right_page;
        } else {
            entries[child_index].0 = right_page;
            entries.insert(child_index, (split_child, separator));
        }

        let mid = entries.len() / 2;
        let (mid_child, promoted) = entries[mid];

        let new_right = {
            let mut right_guard = self.pager.allocate_page()?;
            let right_num = right_guard.page_num();
            let mut right = InteriorNodeMut::init(right_guard.data_mut(), right_num, rightmost)?;
            for (i, &(child, sep)) in entries[mid + 1..].iter().enumerate() {
                right.insert_cell(i, child, sep)?;
            }
            right_num
        };

        {
            let mut left_guard = self.pager.get_page(page_num)?;
            let mut left = InteriorNodeMut::init(left_guard.data_mut(), page_num, mid_child)?;
            for (i, &(child, sep)) in entries[..mid].iter().enumerate() {
                left.insert_cell(i, child, sep)?;
            }
        }

        trace!(
            left = page_num,
            right = new_right,
            separator = promoted,
            "split interior node"
        );
        Ok(InsertOutcome::Split {
            right_page: new_right,
            separator: promoted,
        })
    }

    /// Grows the tree by one level after a root split, preserving the
    /// root's page number: the root's content moves into a fresh left
    /// child and the root becomes a two-way interior node.
    fn grow_root(&self, right_page: u32, separator: i64) -> Result<()> {
        let left_page = {
            let root_guard = self.pager.get_page(self.root_page)?;
            let mut left_guard = self.pager.allocate_page()?;
            let left_num = left_guard.page_num();

            match node::page_type(root_guard.data(), self.root_page)? {
                PageType::Leaf => {
                    let root = LeafNode::from_page(root_guard.data(), self.root_page)?;
                    let mut left = LeafNodeMut::init(left_guard.data_mut(), left_num)?;
                    for i in 0..root.cell_count() {
                        left.insert_raw(i, root.cell_bytes_at(i)?)?;
                    }
                    left.set_next_leaf(root.next_leaf()?)?;
                }
                PageType::Interior => {
                    let root = InteriorNode::from_page(root_guard.data(), self.root_page)?;
                    let mut left = InteriorNodeMut::init(
                        left_guard.data_mut(),
                        left_num,
                        root.rightmost_child()?,
                    )?;
                    for i in 0..root.cell_count() {
                        let (child, sep) = root.cell_at(i)?;
                        left.insert_cell(i, child, sep)?;
                    }
                }
            }
            left_num
        };

        let mut root_guard = self.pager.get_page(self.root_page)?;
        let mut root = InteriorNodeMut::init(root_guard.data_mut(), self.root_page, right_page)?;
        root.insert_cell(0, left_page, separator)?;

        trace!(
            root = self.root_page,
            left = left_page,
            right = right_page,
            "tree grew in height"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Removes the cell keyed `rowid`. No rebalancing: under-full
    /// leaves persist.
    pub fn delete(&self, rowid: i64) -> Result<()> {
        let (page_num, index) = self.locate(rowid)?;
        let mut guard = self.pager.get_page(page_num)?;
        let mut leaf = LeafNodeMut::from_page(guard.data_mut(), page_num)?;
        leaf.remove(index)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    /// Page number of the leftmost leaf.
    pub(crate) fn leftmost_leaf(&self) -> Result<u32> {
        let mut page_num = self.root_page;
        for _ in 0..MAX_DEPTH {
            let guard = self.pager.get_page(page_num)?;
            match node::page_type(guard.data(), page_num)? {
                PageType::Leaf => return Ok(page_num),
                PageType::Interior => {
                    let interior = InteriorNode::from_page(guard.data(), page_num)?;
                    let next = if interior.cell_count() == 0 {
                        interior.rightmost_child()?
                    } else {
                        interior.cell_at(0)?.0
                    };
                    if next == 0 {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "child pointer is zero",
                        });
                    }
                    page_num = next;
                }
            }
        }
        Err(Error::InvalidPageHeader {
            page_num: self.root_page,
            reason: "descent deeper than maximum tree height",
        })
    }

    /// Total number of rows, by walking the leaf chain.
    pub fn count_rows(&self) -> Result<u64> {
        let mut page_num = self.leftmost_leaf()?;
        let mut total = 0u64;
        let mut visited = 0u32;
        let page_limit = self.pager.page_count();

        while page_num != 0 {
            visited += 1;
            if visited > page_limit {
                return Err(Error::InvalidPageHeader {
                    page_num,
                    reason: "leaf chain does not terminate",
                });
            }
            let guard = self.pager.get_page(page_num)?;
            let leaf = LeafNode::from_page(guard.data(), page_num)?;
            total += leaf.cell_count() as u64;
            page_num = leaf.next_leaf()?;
        }
        Ok(total)
    }

    /// The next monotonically assigned rowid: one past the current
    /// maximum, or 1 for an empty tree.
    pub fn next_rowid(&self) -> Result<i64> {
        // Rightmost descent; after deletes the rightmost leaf can be
        // empty, in which case fall back to walking the leaf chain.
        let mut page_num = self.root_page;
        for _ in 0..MAX_DEPTH {
            let guard = self.pager.get_page(page_num)?;
            match node::page_type(guard.data(), page_num)? {
                PageType::Interior => {
                    let interior = InteriorNode::from_page(guard.data(), page_num)?;
                    let next = interior.rightmost_child()?;
                    if next == 0 {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "child pointer is zero",
                        });
                    }
                    page_num = next;
                }
                PageType::Leaf => {
                    let leaf = LeafNode::from_page(guard.data(), page_num)?;
                    if leaf.cell_count() > 0 {
                        let max = leaf.rowid_at(leaf.cell_count() - 1)?;
                        return Ok(max.saturating_add(1));
                    }
                    return self.next_rowid_by_scan();
                }
            }
        }
        Err(Error::InvalidPageHeader {
            page_num: self.root_page,
            reason: "descent deeper than maximum tree height",
        })
    }

    fn next_rowid_by_scan(&self) -> Result<i64> {
        let mut page_num = self.leftmost_leaf()?;
        let mut last: Option<i64> = None;
        let mut visited = 0u32;
        let page_limit = self.pager.page_count();

        while page_num != 0 {
            visited += 1;
            if visited > page_limit {
                return Err(Error::InvalidPageHeader {
                    page_num,
                    reason: "leaf chain does not terminate",
                });
            }
            let guard = self.pager.get_page(page_num)?;
            let leaf = LeafNode::from_page(guard.data(), page_num)?;
            if leaf.cell_count() > 0 {
                last = Some(leaf.rowid_at(leaf.cell_count() - 1)?);
            }
            page_num = leaf.next_leaf()?;
        }
        Ok(last.map(|r| r.saturating_add(1)).unwrap_or(1))
    }

    // ------------------------------------------------------------------
    // Verification
    // ------------------------------------------------------------------

    /// Walks the whole tree asserting the structural invariants: key
    /// ordering within nodes, separator bounds over subtrees, and sane
    /// headers. Diagnostic; cost is a full tree scan.
    pub fn verify(&self) -> Result<()> {
        self.verify_node(self.root_page, None, None, 0)
    }

    fn verify_node(
        &self,
        page_num: u32,
        min_exclusive: Option<i64>,
        max_inclusive: Option<i64>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidPageHeader {
                page_num,
                reason: "descent deeper than maximum tree height",
            });
        }

        let guard = self.pager.get_page(page_num)?;
        match node::page_type(guard.data(), page_num)? {
            PageType::Leaf => {
                let leaf = LeafNode::from_page(guard.data(), page_num)?;
                let mut prev: Option<i64> = None;
                for i in 0..leaf.cell_count() {
                    let rowid = leaf.rowid_at(i)?;
                    if prev.is_some_and(|p| rowid <= p) {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "leaf keys not strictly ascending",
                        });
                    }
                    if min_exclusive.is_some_and(|min| rowid <= min) {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "leaf key at or below subtree bound",
                        });
                    }
                    if max_inclusive.is_some_and(|max| rowid > max) {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "leaf key above subtree bound",
                        });
                    }
                    prev = Some(rowid);
                }
                Ok(())
            }
            PageType::Interior => {
                let interior = InteriorNode::from_page(guard.data(), page_num)?;
                let mut entries = Vec::with_capacity(interior.cell_count());
                for i in 0..interior.cell_count() {
                    entries.push(interior.cell_at(i)?);
                }
                let rightmost = interior.rightmost_child()?;
                drop(guard);

                let mut lower = min_exclusive;
                for &(child, sep) in &entries {
                    if lower.is_some_and(|min| sep <= min) {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "separators not strictly ascending",
                        });
                    }
                    if max_inclusive.is_some_and(|max| sep > max) {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "separator above subtree bound",
                        });
                    }
                    if child == 0 {
                        return Err(Error::InvalidPageHeader {
                            page_num,
                            reason: "child pointer is zero",
                        });
                    }
                    self.verify_node(child, lower, Some(sep), depth + 1)?;
                    lower = Some(sep);
                }

                if rightmost == 0 {
                    return Err(Error::InvalidPageHeader {
                        page_num,
                        reason: "child pointer is zero",
                    });
                }
                self.verify_node(rightmost, lower, max_inclusive, depth + 1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;
    use tempfile::tempdir;

    fn open_tree(capacity: usize) -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let pager = Pager::open_with_capacity(dir.path().join("tree.mdb"), capacity).unwrap();
        (dir, pager)
    }

    fn first_int(tree: &BTree<'_>, rowid: i64) -> i64 {
        let arena = Bump::new();
        tree.find(rowid, &arena).unwrap().values[0]
            .as_int()
            .unwrap()
    }

    #[test]
    fn create_initializes_empty_leaf_root() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        assert_eq!(tree.root_page(), 1);
        assert_eq!(tree.count_rows().unwrap(), 0);
        tree.verify().unwrap();
    }

    #[test]
    fn open_rejects_missing_root() {
        let (_dir, pager) = open_tree(16);
        assert!(matches!(
            BTree::open(&pager, 5),
            Err(Error::PageNotFound { page_num: 5, .. })
        ));
        assert!(matches!(
            BTree::open(&pager, 0),
            Err(Error::InvalidPageNum { .. })
        ));
    }

    #[test]
    fn insert_and_find_single_row() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();

        tree.insert(1, &[Value::Int(100), Value::text("Row One")])
            .unwrap();

        let arena = Bump::new();
        let cell = tree.find(1, &arena).unwrap();
        assert_eq!(cell.rowid, 1);
        assert_eq!(cell.values[0].as_int(), Some(100));
        assert_eq!(cell.values[1].as_text(), Some("Row One"));

        assert!(matches!(
            tree.find(99, &arena),
            Err(Error::CellNotFound { rowid: 99 })
        ));
    }

    #[test]
    fn out_of_order_inserts_sort_by_rowid() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        for rowid in [50i64, 10, 30, 40, 20] {
            tree.insert(rowid, &[Value::Int(rowid)]).unwrap();
        }
        tree.verify().unwrap();
        assert_eq!(tree.count_rows().unwrap(), 5);
        for rowid in [10i64, 20, 30, 40, 50] {
            assert_eq!(first_int(&tree, rowid), rowid);
        }
    }

    #[test]
    fn duplicate_rowid_rejected_by_default() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        tree.insert(10, &[Value::Int(1)]).unwrap();
        assert!(matches!(
            tree.insert(10, &[Value::Int(2)]),
            Err(Error::DuplicateRowid { rowid: 10 })
        ));
        assert_eq!(tree.count_rows().unwrap(), 1);
    }

    #[test]
    fn duplicate_rowid_allowed_on_opt_out() {
        let (_dir, pager) = open_tree(16);
        let mut tree = BTree::create(&pager).unwrap();
        assert!(tree.check_duplicates());
        tree.set_check_duplicates(false);
        assert!(!tree.check_duplicates());
        tree.insert(10, &[Value::Int(1)]).unwrap();
        tree.insert(10, &[Value::Int(2)]).unwrap();
        assert_eq!(tree.count_rows().unwrap(), 2);
    }

    #[test]
    fn delete_removes_only_the_target() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        for rowid in 1..=3i64 {
            tree.insert(rowid, &[Value::Int(rowid * 10)]).unwrap();
        }
        tree.delete(2).unwrap();

        let arena = Bump::new();
        assert!(matches!(
            tree.find(2, &arena),
            Err(Error::CellNotFound { rowid: 2 })
        ));
        assert_eq!(first_int(&tree, 1), 10);
        assert_eq!(first_int(&tree, 3), 30);
        assert_eq!(tree.count_rows().unwrap(), 2);
        tree.verify().unwrap();
    }

    #[test]
    fn delete_missing_rowid_fails() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        tree.insert(1, &[Value::Int(1)]).unwrap();
        assert!(matches!(
            tree.delete(7),
            Err(Error::CellNotFound { rowid: 7 })
        ));
    }

    #[test]
    fn splits_grow_the_root_and_keep_everything_findable() {
        let (_dir, pager) = open_tree(32);
        let tree = BTree::create(&pager).unwrap();
        let payload = "P".repeat(100);

        for rowid in 1..=200i64 {
            tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
                .unwrap();
        }

        tree.verify().unwrap();
        assert_eq!(tree.count_rows().unwrap(), 200);

        // More than a page of ~120-byte cells forces height growth; the
        // root page number must not move.
        assert_eq!(tree.root_page(), 1);
        let guard = pager.get_page(1).unwrap();
        assert_eq!(
            node::page_type(guard.data(), 1).unwrap(),
            PageType::Interior
        );
        drop(guard);

        for rowid in [1i64, 34, 100, 167, 200] {
            assert_eq!(first_int(&tree, rowid), rowid);
        }
    }

    #[test]
    fn reverse_insertion_order_still_sorted() {
        let (_dir, pager) = open_tree(32);
        let tree = BTree::create(&pager).unwrap();
        let payload = "x".repeat(80);

        for rowid in (1..=150i64).rev() {
            tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
                .unwrap();
        }
        tree.verify().unwrap();
        assert_eq!(tree.count_rows().unwrap(), 150);
        for rowid in [1i64, 75, 150] {
            assert_eq!(first_int(&tree, rowid), rowid);
        }
    }

    #[test]
    fn delete_after_splits_keeps_structure_valid() {
        let (_dir, pager) = open_tree(32);
        let tree = BTree::create(&pager).unwrap();
        let payload = "y".repeat(64);

        for rowid in 1..=120i64 {
            tree.insert(rowid, &[Value::text(&payload)]).unwrap();
        }
        for rowid in (1..=120i64).step_by(2) {
            tree.delete(rowid).unwrap();
        }

        tree.verify().unwrap();
        assert_eq!(tree.count_rows().unwrap(), 60);

        let arena = Bump::new();
        for rowid in 1..=120i64 {
            let found = tree.find(rowid, &arena).is_ok();
            assert_eq!(found, rowid % 2 == 0, "rowid {}", rowid);
        }
    }

    #[test]
    fn next_rowid_tracks_maximum() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        assert_eq!(tree.next_rowid().unwrap(), 1);

        tree.insert(5, &[Value::Int(0)]).unwrap();
        assert_eq!(tree.next_rowid().unwrap(), 6);

        tree.insert(2, &[Value::Int(0)]).unwrap();
        assert_eq!(tree.next_rowid().unwrap(), 6);

        tree.delete(5).unwrap();
        assert_eq!(tree.next_rowid().unwrap(), 3);
    }

    #[test]
    fn oversized_cell_rejected_up_front() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        let huge = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            tree.insert(1, &[Value::blob(&huge)]),
            Err(Error::InvalidBounds { .. })
        ));
    }

    #[test]
    fn tree_operations_leave_no_pins_behind() {
        let (_dir, pager) = open_tree(16);
        let tree = BTree::create(&pager).unwrap();
        let payload = "z".repeat(100);
        for rowid in 1..=100i64 {
            tree.insert(rowid, &[Value::text(&payload)]).unwrap();
        }
        let arena = Bump::new();
        let _ = tree.find(50, &arena).unwrap();
        tree.delete(60).unwrap();
        tree.verify().unwrap();

        for page in 1..=pager.page_count() {
            assert_eq!(pager.pin_count(page), 0, "page {} still pinned", page);
        }
    }
}
