//! # Cursor
//!
//! A cursor is a stack of `(page_num, cell_index)` entries from the
//! root to the current leaf cell. It stores page numbers, not
//! pointers, so it can be suspended between reads: any page on its
//! path may be evicted and re-read without invalidating the position.
//!
//! ## Traversal
//!
//! `start` descends leftmost (at an interior node, the first cell's
//! child, or the rightmost child of a cell-less node). `advance` steps
//! within the leaf, and on exhaustion pops to the nearest ancestor
//! with an unvisited sibling subtree, then descends that subtree's
//! leftmost path. An interior entry's `cell_index` equal to its cell
//! count denotes the rightmost child.
//!
//! Leaves emptied by deletes are skipped transparently; the cursor
//! yields exactly the live cells in ascending rowid order.
//!
//! ## Reading
//!
//! [`Cursor::cell`] deep-copies the current record into a caller
//! arena; [`Cursor::with_cell`] lends a zero-copy view while the leaf
//! page is pinned for the closure's duration.

use bumpalo::Bump;
use smallvec::SmallVec;

use crate::btree::node::{self, InteriorNode, LeafNode, PageType};
use crate::btree::tree::{BTree, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::records::{self, Cell};

#[derive(Debug, Clone, Copy)]
struct CursorEntry {
    page_num: u32,
    cell_index: usize,
}

pub struct Cursor<'t, 'p> {
    tree: &'t BTree<'p>,
    path: SmallVec<[CursorEntry; 8]>,
    valid: bool,
}

impl<'p> BTree<'p> {
    /// Positions a cursor on the smallest rowid in the tree.
    pub fn cursor(&self) -> Result<Cursor<'_, 'p>> {
        let mut cursor = Cursor {
            tree: self,
            path: SmallVec::new(),
            valid: false,
        };
        if cursor.descend_from(self.root_page())? {
            cursor.valid = true;
        } else {
            // The leftmost leaf is empty (delete-heavy tree); walk on
            // to the first populated one.
            cursor.path.pop();
            cursor.valid = cursor.advance_to_next_leaf()?;
        }
        Ok(cursor)
    }
}

impl Cursor<'_, '_> {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    fn current(&self) -> Result<(u32, usize)> {
        match self.path.last() {
            Some(entry) if self.valid => Ok((entry.page_num, entry.cell_index)),
            _ => Err(Error::InvalidBounds {
                what: "cursor position",
                value: self.path.len(),
                limit: 0,
            }),
        }
    }

    /// Rowid at the current position.
    pub fn rowid(&self) -> Result<i64> {
        let (page_num, index) = self.current()?;
        let guard = self.tree.pager().get_page(page_num)?;
        let leaf = LeafNode::from_page(guard.data(), page_num)?;
        leaf.rowid_at(index)
    }

    /// Deep-copies the current record into `arena`.
    pub fn cell<'b>(&self, arena: &'b Bump) -> Result<Cell<'b>> {
        let (page_num, index) = self.current()?;
        let guard = self.tree.pager().get_page(page_num)?;
        let leaf = LeafNode::from_page(guard.data(), page_num)?;
        let offset = leaf.cell_pointer(index)?;
        let (cell, _) = records::deserialize_in(guard.data(), offset, arena)?;
        Ok(cell)
    }

    /// Lends the current record without copying; the leaf page stays
    /// pinned while the closure runs.
    pub fn with_cell<R>(&self, f: impl FnOnce(&Cell<'_>) -> R) -> Result<R> {
        let (page_num, index) = self.current()?;
        let guard = self.tree.pager().get_page(page_num)?;
        let leaf = LeafNode::from_page(guard.data(), page_num)?;
        let offset = leaf.cell_pointer(index)?;
        let (cell, _) = records::deserialize_borrowed(guard.data(), offset)?;
        Ok(f(&cell))
    }

    /// Moves to the next rowid. Returns whether the cursor is still
    /// valid; advancing an exhausted cursor is a no-op.
    pub fn advance(&mut self) -> Result<bool> {
        if !self.valid {
            return Ok(false);
        }

        if let Some(top) = self.path.last_mut() {
            top.cell_index += 1;
            let (page_num, index) = (top.page_num, top.cell_index);
            let guard = self.tree.pager().get_page(page_num)?;
            let leaf = LeafNode::from_page(guard.data(), page_num)?;
            if index < leaf.cell_count() {
                return Ok(true);
            }
        }

        self.path.pop();
        self.valid = self.advance_to_next_leaf()?;
        Ok(self.valid)
    }

    /// Pushes path entries from `page_num` down to its leftmost leaf.
    /// Returns whether that leaf has any cells.
    fn descend_from(&mut self, mut page_num: u32) -> Result<bool> {
        for _ in 0..MAX_DEPTH {
            let guard = self.tree.pager().get_page(page_num)?;
            match node::page_type(guard.data(), page_num)? {
                PageType::Leaf => {
                    let leaf = LeafNode::from_page(guard.data(), page_num)?;
                    let populated = leaf.cell_count() > 0;
                    self.path.push(CursorEntry {
                        page_num,
                        cell_index: 0,
                    });
                    return Ok(populated);
                }
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
                    self.path.push(CursorEntry {
                        page_num,
                        cell_index: 0,
                    });
                    page_num = next;
                }
            }
        }
        Err(Error::InvalidPageHeader {
            page_num,
            reason: "descent deeper than maximum tree height",
        })
    }

    /// Pops exhausted ancestors and descends the next sibling subtree
    /// until a populated leaf is found. Returns false when the tree is
    /// exhausted.
    fn advance_to_next_leaf(&mut self) -> Result<bool> {
        loop {
            let Some(top) = self.path.last_mut() else {
                return Ok(false);
            };
            top.cell_index += 1;
            let (page_num, index) = (top.page_num, top.cell_index);

            let child = {
                let guard = self.tree.pager().get_page(page_num)?;
                let interior = InteriorNode::from_page(guard.data(), page_num)?;
                let count = interior.cell_count();
                if index > count {
                    None
                } else if index == count {
                    Some(interior.rightmost_child()?)
                } else {
                    Some(interior.cell_at(index)?.0)
                }
            };

            match child {
                None => {
                    self.path.pop();
                }
                Some(0) => {
                    return Err(Error::InvalidPageHeader {
                        page_num,
                        reason: "child pointer is zero",
                    });
                }
                Some(child) => {
                    if self.descend_from(child)? {
                        return Ok(true);
                    }
                    // Empty leaf; drop it and resume from its parent,
                    // which is now the top of the path.
                    self.path.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Value;
    use crate::storage::Pager;
    use tempfile::tempdir;

    fn tree_with_rowids(rowids: &[i64]) -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let pager = Pager::open_with_capacity(dir.path().join("cursor.mdb"), 32).unwrap();
        {
            let tree = BTree::create(&pager).unwrap();
            for &rowid in rowids {
                tree.insert(rowid, &[Value::Int(rowid)]).unwrap();
            }
        }
        (dir, pager)
    }

    fn collect_rowids(tree: &BTree<'_>) -> Vec<i64> {
        let mut cursor = tree.cursor().unwrap();
        let mut out = Vec::new();
        while cursor.is_valid() {
            out.push(cursor.rowid().unwrap());
            cursor.advance().unwrap();
        }
        out
    }

    #[test]
    fn empty_tree_yields_invalid_cursor() {
        let (_dir, pager) = tree_with_rowids(&[]);
        let tree = BTree::open(&pager, 1).unwrap();
        let cursor = tree.cursor().unwrap();
        assert!(!cursor.is_valid());
        assert!(cursor.rowid().is_err());
    }

    #[test]
    fn yields_sorted_order_regardless_of_insertion_order() {
        let (_dir, pager) = tree_with_rowids(&[50, 10, 30, 40, 20]);
        let tree = BTree::open(&pager, 1).unwrap();
        assert_eq!(collect_rowids(&tree), vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn values_come_back_with_their_rowids() {
        let (_dir, pager) = tree_with_rowids(&[3, 1, 2]);
        let tree = BTree::open(&pager, 1).unwrap();

        let mut cursor = tree.cursor().unwrap();
        let arena = Bump::new();
        let mut seen = Vec::new();
        while cursor.is_valid() {
            let cell = cursor.cell(&arena).unwrap();
            seen.push((cell.rowid, cell.values[0].as_int().unwrap()));
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn advancing_past_end_is_a_no_op() {
        let (_dir, pager) = tree_with_rowids(&[1]);
        let tree = BTree::open(&pager, 1).unwrap();
        let mut cursor = tree.cursor().unwrap();

        assert!(!cursor.advance().unwrap());
        assert!(!cursor.advance().unwrap());
        assert!(!cursor.is_valid());
        assert!(cursor.cell(&Bump::new()).is_err());
    }

    #[test]
    fn traverses_across_leaf_splits() {
        let rowids: Vec<i64> = (1..=300).collect();
        let dir = tempdir().unwrap();
        let pager = Pager::open_with_capacity(dir.path().join("cursor.mdb"), 32).unwrap();
        let tree = BTree::create(&pager).unwrap();
        let payload = "p".repeat(60);
        for &rowid in &rowids {
            tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
                .unwrap();
        }

        assert_eq!(collect_rowids(&tree), rowids);
    }

    #[test]
    fn skips_leaves_emptied_by_deletes() {
        let dir = tempdir().unwrap();
        let pager = Pager::open_with_capacity(dir.path().join("cursor.mdb"), 32).unwrap();
        let tree = BTree::create(&pager).unwrap();
        let payload = "q".repeat(100);
        for rowid in 1..=120i64 {
            tree.insert(rowid, &[Value::text(&payload)]).unwrap();
        }
        // Drain the low end so the leftmost leaf (at least) is empty.
        for rowid in 1..=40i64 {
            tree.delete(rowid).unwrap();
        }

        let got = collect_rowids(&tree);
        let want: Vec<i64> = (41..=120).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn with_cell_lends_borrowed_values() {
        let dir = tempdir().unwrap();
        let pager = Pager::open_with_capacity(dir.path().join("cursor.mdb"), 32).unwrap();
        let tree = BTree::create(&pager).unwrap();
        tree.insert(7, &[Value::text("lend")]).unwrap();

        let cursor = tree.cursor().unwrap();
        let len = cursor
            .with_cell(|cell| cell.values[0].as_text().map(str::len))
            .unwrap();
        assert_eq!(len, Some(4));
    }

    #[test]
    fn cursor_survives_eviction_between_steps() {
        let dir = tempdir().unwrap();
        // A cache this small churns constantly during the scan.
        let pager = Pager::open_with_capacity(dir.path().join("cursor.mdb"), 8).unwrap();
        let tree = BTree::create(&pager).unwrap();
        let payload = "r".repeat(80);
        for rowid in 1..=200i64 {
            tree.insert(rowid, &[Value::text(&payload)]).unwrap();
        }

        let mut cursor = tree.cursor().unwrap();
        let mut count = 0i64;
        while cursor.is_valid() {
            count += 1;
            assert_eq!(cursor.rowid().unwrap(), count);
            // Interleave unrelated reads to force churn on the path.
            let arena = Bump::new();
            let _ = tree.find(200 - (count % 100), &arena).unwrap();
            cursor.advance().unwrap();
        }
        assert_eq!(count, 200);
    }
}
