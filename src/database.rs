//! # Database Facade
//!
//! Wires the layers together behind one handle: opening validates or
//! initializes the header page, [`Database::catalog`] exposes the
//! schema tree, and [`Database::tree`] opens any table tree by root
//! page.
//!
//! ## Open Semantics
//!
//! - A zero-length file is initialized: page 1 is allocated, the
//!   database header is written at offset 0, the schema tree's root
//!   leaf is initialized at offset 100, and everything is flushed and
//!   synced before `open` returns.
//! - A non-empty file must carry the expected magic, page size, and
//!   schema version, or open fails with [`Error::InvalidPageHeader`]
//!   and the file is left untouched.
//!
//! ## Durability
//!
//! Writes accumulate in the page cache. [`Database::checkpoint`]
//! refreshes the header's page count, flushes every dirty page, and
//! fsyncs; [`Database::close`] checkpoints and releases the file.
//! Dropping the handle flushes best-effort.

use std::path::Path;

use tracing::{debug, warn};

use crate::btree::{BTree, LeafNodeMut};
use crate::config::{DB_HEADER_SIZE, SCHEMA_ROOT_PAGE};
use crate::error::Result;
use crate::schema::{Catalog, Column};
use crate::storage::{DbHeader, Pager};

pub struct Database {
    pager: Pager,
}

impl Database {
    /// Opens or creates a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pager = Pager::open(path)?;
        Self::with_pager(pager)
    }

    /// Opens or creates a database file with a bounded page cache.
    pub fn open_with_capacity(path: impl AsRef<Path>, cache_pages: usize) -> Result<Self> {
        let pager = Pager::open_with_capacity(path, cache_pages)?;
        Self::with_pager(pager)
    }

    fn with_pager(pager: Pager) -> Result<Self> {
        let fresh = pager.page_count() == 0;
        {
            let mut guard = pager.get_or_allocate_page(SCHEMA_ROOT_PAGE)?;
            if fresh {
                let data = guard.data_mut();
                DbHeader::new().write_to(data)?;
                LeafNodeMut::init(data, SCHEMA_ROOT_PAGE)?;
                debug!("initialized fresh database");
            } else {
                let header = DbHeader::from_bytes(guard.data())?;
                if let Err(err) = header.validate() {
                    warn!(%err, "rejecting database file with bad header");
                    return Err(err);
                }
            }
        }
        if fresh {
            pager.sync_file()?;
        }
        Ok(Self { pager })
    }

    /// The underlying pager, for explicit flush/sync control.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Opens the schema catalog.
    pub fn catalog(&self) -> Result<Catalog<'_>> {
        Catalog::open(&self.pager)
    }

    /// Opens the tree rooted at `root_page`.
    pub fn tree(&self, root_page: u32) -> Result<BTree<'_>> {
        BTree::open(&self.pager, root_page)
    }

    /// Allocates a fresh tree and returns it; the caller owns wiring
    /// its root page into the catalog.
    pub fn create_tree(&self) -> Result<BTree<'_>> {
        BTree::create(&self.pager)
    }

    /// Creates a table: allocates its tree and registers the
    /// descriptor. Returns the new root page.
    pub fn create_table(&self, name: &str, columns: &[Column], sql: &str) -> Result<u32> {
        let tree = self.create_tree()?;
        let root_page = tree.root_page();
        self.catalog()?.add_table(name, columns, root_page, sql)?;
        Ok(root_page)
    }

    /// Removes a table's catalog entry. Its data pages stay in the
    /// file; there is no reclamation.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.catalog()?.drop_table(name)
    }

    /// Refreshes the header's page count, flushes every dirty page,
    /// and fsyncs.
    pub fn checkpoint(&self) -> Result<()> {
        let page_count = self.pager.page_count();
        {
            let mut guard = self.pager.get_page(SCHEMA_ROOT_PAGE)?;
            DbHeader::from_bytes_mut(guard.data_mut())?.set_page_count(page_count);
        }
        self.pager.sync_file()
    }

    /// Checkpoints and closes the file.
    ///
    /// # Panics
    ///
    /// Panics if any page guard is still alive, mirroring
    /// [`Pager::close`].
    pub fn close(self) -> Result<()> {
        self.checkpoint()?;
        self.pager.close()
    }

    /// Stored page count from the database header. Diagnostic; the
    /// live count is [`Pager::page_count`].
    pub fn header_page_count(&self) -> Result<u32> {
        let guard = self.pager.get_page(SCHEMA_ROOT_PAGE)?;
        Ok(DbHeader::from_bytes(&guard.data()[..DB_HEADER_SIZE])?.page_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAGIC;
    use crate::error::Error;
    use crate::records::Value;
    use crate::schema::ColumnType;
    use bumpalo::Bump;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn open_initializes_header_and_schema_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.mdb");

        let db = Database::open(&path).unwrap();
        assert_eq!(db.pager().page_count(), 1);
        assert_eq!(db.header_page_count().unwrap(), 1);
        assert_eq!(db.catalog().unwrap().list_tables().unwrap().len(), 0);
        db.close().unwrap();

        // The magic is on disk at offset 0.
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..13], &MAGIC);
    }

    #[test]
    fn reopen_preserves_schema_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.mdb");

        let root = {
            let db = Database::open(&path).unwrap();
            let columns = vec![Column::new("n", ColumnType::Integer)];
            let root = db
                .create_table("numbers", &columns, "CREATE TABLE numbers (n INTEGER)")
                .unwrap();
            db.tree(root).unwrap().insert(42, &[Value::Int(999)]).unwrap();
            db.close().unwrap();
            root
        };

        let db = Database::open(&path).unwrap();
        assert_eq!(db.catalog().unwrap().find_table("numbers").unwrap(), Some(root));

        let tree = db.tree(root).unwrap();
        let arena = Bump::new();
        assert_eq!(tree.find(42, &arena).unwrap().values[0].as_int(), Some(999));
    }

    #[test]
    fn foreign_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-a-db.bin");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(&vec![0x42u8; 8192]).unwrap();
        }

        assert!(matches!(
            Database::open(&path),
            Err(Error::InvalidPageHeader { .. })
        ));
    }

    #[test]
    fn checkpoint_tracks_page_count() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("app.mdb")).unwrap();

        let columns = vec![Column::new("b", ColumnType::Blob)];
        let root = db
            .create_table("blobs", &columns, "CREATE TABLE blobs (b BLOB)")
            .unwrap();
        let tree = db.tree(root).unwrap();
        let payload = vec![7u8; 500];
        for rowid in 1..=40i64 {
            tree.insert(rowid, &[Value::blob(&payload)]).unwrap();
        }
        db.checkpoint().unwrap();

        assert!(db.pager().page_count() > 2);
        assert_eq!(db.header_page_count().unwrap(), db.pager().page_count());
    }

    #[test]
    fn drop_table_then_recreate() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("app.mdb")).unwrap();
        let columns = vec![Column::new("x", ColumnType::Integer)];

        db.create_table("t", &columns, "CREATE TABLE t (x INTEGER)")
            .unwrap();
        db.drop_table("t").unwrap();
        assert!(!db.catalog().unwrap().table_exists("t").unwrap());

        // The name is free again even though the old pages remain.
        db.create_table("t", &columns, "CREATE TABLE t (x INTEGER)")
            .unwrap();
        assert!(db.catalog().unwrap().table_exists("t").unwrap());
    }
}
