//! # Storage Engine Integration Suite
//!
//! End-to-end scenarios over a real file: point lookups, ordered
//! scans, splits, duplicate handling, durability across reopen, and
//! the pin/borrow contracts of the pager.
//!
//! ## Usage
//!
//! ```sh
//! cargo test --test storage_engine
//! ```

use bumpalo::Bump;
use tempfile::tempdir;

use magnidb::btree::node::{self, PageType};
use magnidb::{BTree, Error, Pager, Value};

fn open_pager(dir: &tempfile::TempDir, capacity: usize) -> Pager {
    Pager::open_with_capacity(dir.path().join("engine.mdb"), capacity).unwrap()
}

fn first_int(tree: &BTree<'_>, rowid: i64) -> i64 {
    let arena = Bump::new();
    tree.find(rowid, &arena).unwrap().values[0]
        .as_int()
        .unwrap()
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

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn fresh_tree_insert_find_count() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();

    tree.insert(1, &[Value::Int(100), Value::text("Row One")])
        .unwrap();
    tree.insert(2, &[Value::Int(200), Value::text("Row Two")])
        .unwrap();

    let arena = Bump::new();
    let cell = tree.find(1, &arena).unwrap();
    assert_eq!(cell.rowid, 1);
    assert_eq!(cell.values[0].as_int(), Some(100));

    assert!(matches!(
        tree.find(99, &arena),
        Err(Error::CellNotFound { rowid: 99 })
    ));
    assert_eq!(tree.count_rows().unwrap(), 2);
}

#[test]
fn rows_survive_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.mdb");

    let root = {
        let pager = Pager::open_with_capacity(&path, 32).unwrap();
        let tree = BTree::create(&pager).unwrap();
        tree.insert(42, &[Value::Int(999)]).unwrap();
        let root = tree.root_page();
        pager.flush_all().unwrap();
        pager.sync_file().unwrap();
        pager.close().unwrap();
        root
    };

    let pager = Pager::open_with_capacity(&path, 32).unwrap();
    let tree = BTree::open(&pager, root).unwrap();
    assert_eq!(first_int(&tree, 42), 999);
}

#[test]
fn two_hundred_rows_with_fixed_payload() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();
    let payload = "P".repeat(100);

    for rowid in 1..=200i64 {
        tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
            .unwrap();
    }

    tree.verify().unwrap();
    assert_eq!(first_int(&tree, 1), 1);
    assert_eq!(first_int(&tree, 100), 100);
    assert_eq!(first_int(&tree, 200), 200);

    let want: Vec<i64> = (1..=200).collect();
    assert_eq!(collect_rowids(&tree), want);
}

#[test]
fn cursor_yields_sorted_order_for_shuffled_inserts() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();

    for rowid in [50i64, 10, 30, 40, 20] {
        tree.insert(rowid, &[Value::Int(rowid)]).unwrap();
    }

    let mut cursor = tree.cursor().unwrap();
    let arena = Bump::new();
    let mut values = Vec::new();
    while cursor.is_valid() {
        values.push(cursor.cell(&arena).unwrap().values[0].as_int().unwrap());
        cursor.advance().unwrap();
    }
    assert_eq!(values, vec![10, 20, 30, 40, 50]);
}

#[test]
fn delete_leaves_neighbors_intact() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();

    for rowid in [1i64, 2, 3] {
        tree.insert(rowid, &[Value::Int(rowid)]).unwrap();
    }
    tree.delete(2).unwrap();

    let arena = Bump::new();
    assert!(matches!(
        tree.find(2, &arena),
        Err(Error::CellNotFound { rowid: 2 })
    ));
    assert!(tree.find(1, &arena).is_ok());
    assert!(tree.find(3, &arena).is_ok());
    assert_eq!(tree.count_rows().unwrap(), 2);
}

#[test]
fn duplicate_rowid_respects_check_flag() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);

    let tree = BTree::create(&pager).unwrap();
    tree.insert(10, &[Value::Int(1)]).unwrap();
    assert!(matches!(
        tree.insert(10, &[Value::Int(2)]),
        Err(Error::DuplicateRowid { rowid: 10 })
    ));

    let mut relaxed = BTree::create(&pager).unwrap();
    relaxed.set_check_duplicates(false);
    relaxed.insert(10, &[Value::Int(1)]).unwrap();
    relaxed.insert(10, &[Value::Int(2)]).unwrap();
    assert_eq!(relaxed.count_rows().unwrap(), 2);
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn pager_durability_after_sync() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.mdb");

    let mut expected = Vec::new();
    {
        let pager = Pager::open_with_capacity(&path, 16).unwrap();
        for i in 0..10u32 {
            let mut guard = pager.allocate_page().unwrap();
            let fill = (i as u8).wrapping_mul(17).wrapping_add(3);
            guard.data_mut().fill(fill);
            expected.push(fill);
        }
        pager.flush_all().unwrap();
        pager.sync_file().unwrap();
        pager.close().unwrap();
    }

    let pager = Pager::open_with_capacity(&path, 16).unwrap();
    assert_eq!(pager.page_count(), 10);
    for (i, &fill) in expected.iter().enumerate() {
        let guard = pager.get_page(i as u32 + 1).unwrap();
        assert!(
            guard.data().iter().all(|&b| b == fill),
            "page {} contents changed",
            i + 1
        );
    }
}

#[test]
fn pager_identity_under_repeated_pins() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 16);
    drop(pager.allocate_page().unwrap());

    let a = pager.get_page(1).unwrap();
    let b = pager.get_page(1).unwrap();
    assert_eq!(a.data().as_ptr(), b.data().as_ptr());
    assert_eq!(pager.pin_count(1), 2);
}

#[test]
fn seventy_plus_records_force_an_interior_root() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();
    let payload = "S".repeat(100);

    for rowid in 1..=70i64 {
        tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
            .unwrap();
    }

    let guard = pager.get_page(tree.root_page()).unwrap();
    assert_eq!(
        node::page_type(guard.data(), tree.root_page()).unwrap(),
        PageType::Interior
    );
    drop(guard);

    tree.verify().unwrap();
    let seen = collect_rowids(&tree);
    let want: Vec<i64> = (1..=70).collect();
    assert_eq!(seen, want, "every key appears exactly once, in order");
    for rowid in 1..=70i64 {
        assert_eq!(first_int(&tree, rowid), rowid);
    }
}

#[test]
fn leaf_chain_agrees_with_cursor_after_splits() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();
    let payload = "L".repeat(90);

    for rowid in 1..=250i64 {
        tree.insert(rowid, &[Value::text(&payload)]).unwrap();
    }

    // Walk the next_leaf chain by hand, collecting rowids.
    let mut chained = Vec::new();
    let mut leaf_pages = 0;
    let mut page_num = {
        // Descend leftmost from the root.
        let mut current = tree.root_page();
        loop {
            let guard = pager.get_page(current).unwrap();
            match node::page_type(guard.data(), current).unwrap() {
                PageType::Leaf => break current,
                PageType::Interior => {
                    let interior =
                        magnidb::btree::InteriorNode::from_page(guard.data(), current).unwrap();
                    current = interior.cell_at(0).unwrap().0;
                }
            }
        }
    };
    while page_num != 0 {
        leaf_pages += 1;
        let guard = pager.get_page(page_num).unwrap();
        let leaf = magnidb::btree::LeafNode::from_page(guard.data(), page_num).unwrap();
        for i in 0..leaf.cell_count() {
            chained.push(leaf.rowid_at(i).unwrap());
        }
        page_num = leaf.next_leaf().unwrap();
    }

    assert!(leaf_pages > 2, "splits produced multiple leaves");
    let want: Vec<i64> = (1..=250).collect();
    assert_eq!(chained, want);
    assert_eq!(collect_rowids(&tree), want);
}

#[test]
fn zero_copy_find_borrows_from_the_pinned_page() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 16);
    let tree = BTree::create(&pager).unwrap();
    tree.insert(1, &[Value::text("borrowed bytes")]).unwrap();

    let borrowed = tree
        .find_zero_copy(1, |cell| {
            matches!(
                cell.values[0],
                Value::Text(std::borrow::Cow::Borrowed(_))
            )
        })
        .unwrap();
    assert!(borrowed, "zero-copy read must not allocate a copy");

    // The arena path hands back memory that outlives the page pin.
    let arena = Bump::new();
    let cell = tree.find(1, &arena).unwrap();
    assert_eq!(cell.values[0].as_text(), Some("borrowed bytes"));
}

#[test]
fn scan_is_stable_while_unrelated_writes_land_behind_it() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 16);
    let tree = BTree::create(&pager).unwrap();
    let payload = "w".repeat(100);

    for rowid in (1..=100i64).map(|i| i * 10) {
        tree.insert(rowid, &[Value::text(&payload)]).unwrap();
    }

    // Advance a cursor while inserting keys far behind it; the cursor
    // records page numbers, not pointers, so cache churn from the
    // writes must not derail it.
    let mut cursor = tree.cursor().unwrap();
    let mut seen = Vec::new();
    let mut extra = 0i64;
    while cursor.is_valid() {
        let rowid = cursor.rowid().unwrap();
        seen.push(rowid);
        if rowid > 500 && extra < 5 {
            extra += 1;
            tree.insert(extra, &[Value::text(&payload)]).unwrap();
        }
        cursor.advance().unwrap();
    }

    let want: Vec<i64> = (1..=100).map(|i| i * 10).collect();
    assert_eq!(seen, want);
    assert_eq!(tree.count_rows().unwrap(), 105);
}

#[test]
fn mixed_workload_stays_verifiable() {
    let dir = tempdir().unwrap();
    let pager = open_pager(&dir, 32);
    let tree = BTree::create(&pager).unwrap();
    let payload = "m".repeat(60);

    for rowid in 1..=400i64 {
        tree.insert(rowid, &[Value::Int(rowid), Value::text(&payload)])
            .unwrap();
        if rowid % 3 == 0 {
            tree.delete(rowid / 3).unwrap();
        }
    }
    tree.verify().unwrap();

    let total = tree.count_rows().unwrap();
    assert_eq!(total, 400 - 133);

    let rowids = collect_rowids(&tree);
    assert_eq!(rowids.len() as u64, total);
    assert!(rowids.windows(2).all(|w| w[0] < w[1]), "strictly ascending");
}
