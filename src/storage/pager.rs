//! # Pager
//!
//! A bounded page cache over a block-addressed file. The pager is the
//! only component that performs I/O; everything above it sees pages as
//! pinned byte buffers.
//!
//! ## Addressing
//!
//! Pages are 1-indexed: page `n` lives at file offset
//! `(n - 1) * PAGE_SIZE`. There is no page 0 on disk; requesting it
//! fails with [`Error::InvalidPageNum`].
//!
//! ## Pin/Unpin Protocol
//!
//! 1. [`Pager::get_page`] returns a [`PageGuard`] and increments the
//!    page's pin count.
//! 2. The caller reads or writes through the guard.
//! 3. Dropping the guard unpins the page.
//! 4. Pages with `pin_count > 0` are never evicted, so the guard's
//!    buffer stays valid for its whole lifetime.
//!
//! ## Eviction
//!
//! When the cache is at capacity and a new slot is needed:
//!
//! 1. Evict any page with `pin_count == 0` and `dirty == false`.
//! 2. If none exists, flush the unpinned dirty pages and retry step 1.
//! 3. If every cached page is pinned, fail with [`Error::CacheFull`].
//!
//! The scan order is whatever the cache map yields; the contract is
//! only that a page is never evicted while pinned or dirty.
//!
//! ## Thread Safety
//!
//! One `parking_lot::Mutex` serializes every public operation, so two
//! threads may share a pager without corrupting its maps. No pair of
//! concurrent writers is supported and readers get no cross-call
//! snapshot; the recommended usage is one thread per database handle.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::{DEFAULT_CACHE_PAGES, MIN_CACHE_PAGES, PAGE_SIZE};
use crate::error::{Error, Result};
use crate::storage::page::Page;

pub struct Pager {
    inner: Mutex<PagerInner>,
}

struct PagerInner {
    file: File,
    file_len: u64,
    capacity: usize,
    cache: HashMap<u32, Page>,
}

impl Pager {
    /// Opens or creates the database file with the default cache size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_CACHE_PAGES)
    }

    /// Opens or creates the database file with a cache of at most
    /// `capacity` pages (clamped to [`MIN_CACHE_PAGES`]).
    pub fn open_with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let capacity = capacity.max(MIN_CACHE_PAGES);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| Error::FileOpenFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let file_len = file.metadata()?.len();

        if file_len % PAGE_SIZE as u64 != 0 {
            warn!(
                path = %path.display(),
                file_len,
                "file length is not page-aligned; trailing bytes ignored"
            );
        }
        debug!(
            path = %path.display(),
            pages = file_len / PAGE_SIZE as u64,
            capacity,
            "opened database file"
        );

        Ok(Self {
            inner: Mutex::new(PagerInner {
                file,
                file_len,
                capacity,
                cache: HashMap::with_capacity(capacity),
            }),
        })
    }

    /// Number of pages currently in the file (committed or pending
    /// flush).
    pub fn page_count(&self) -> u32 {
        let inner = self.inner.lock();
        inner.page_count()
    }

    /// Returns a pinned guard for page `page_num`, reading it from the
    /// file on a cache miss.
    pub fn get_page(&self, page_num: u32) -> Result<PageGuard<'_>> {
        if page_num == 0 {
            return Err(Error::InvalidPageNum { page_num });
        }
        let mut inner = self.inner.lock();

        if let Some(page) = inner.cache.get_mut(&page_num) {
            page.pin();
            let data = page.data_ptr();
            return Ok(PageGuard {
                pager: self,
                page_num,
                data,
            });
        }

        let page_count = inner.page_count();
        if page_num > page_count {
            return Err(Error::PageNotFound {
                page_num,
                page_count,
            });
        }

        inner.ensure_slot()?;

        let mut page = Page::new(page_num);
        inner
            .file
            .seek(SeekFrom::Start((page_num as u64 - 1) * PAGE_SIZE as u64))?;
        inner.file.read_exact(page.data_mut())?;

        page.pin();
        let data = page.data_ptr();
        inner.cache.insert(page_num, page);

        Ok(PageGuard {
            pager: self,
            page_num,
            data,
        })
    }

    /// Extends the file logically by one page and returns it
    /// zero-filled, dirty, and pinned. The write to disk is deferred
    /// until flush.
    pub fn allocate_page(&self) -> Result<PageGuard<'_>> {
        let mut inner = self.inner.lock();

        let page_num = inner
            .page_count()
            .checked_add(1)
            .ok_or(Error::InvalidPageNum { page_num: u32::MAX })?;

        inner.ensure_slot()?;

        let mut page = Page::new(page_num);
        page.mark_dirty();
        page.pin();
        let data = page.data_ptr();
        inner.cache.insert(page_num, page);
        inner.file_len += PAGE_SIZE as u64;

        trace!(page = page_num, "allocated page");
        Ok(PageGuard {
            pager: self,
            page_num,
            data,
        })
    }

    /// Returns page `page_num` if it exists, allocates it if it is the
    /// next page after the current end, and fails otherwise. Used by
    /// code paths that initialize a fixed page on first open.
    pub fn get_or_allocate_page(&self, page_num: u32) -> Result<PageGuard<'_>> {
        if page_num == 0 {
            return Err(Error::InvalidPageNum { page_num });
        }
        let page_count = self.page_count();
        if page_num <= page_count {
            self.get_page(page_num)
        } else if page_num == page_count + 1 {
            let guard = self.allocate_page()?;
            debug_assert_eq!(guard.page_num(), page_num);
            Ok(guard)
        } else {
            Err(Error::InvalidPageNum { page_num })
        }
    }

    /// Decrements the pin count of `page_num`, clamping at zero.
    /// Normally driven by [`PageGuard::drop`].
    pub fn unpin_page(&self, page_num: u32) {
        let mut inner = self.inner.lock();
        if let Some(page) = inner.cache.get_mut(&page_num) {
            page.unpin();
        }
    }

    /// Flags `page_num` as diverging from the file.
    pub fn mark_dirty(&self, page_num: u32) {
        let mut inner = self.inner.lock();
        if let Some(page) = inner.cache.get_mut(&page_num) {
            page.mark_dirty();
        }
    }

    /// Writes the named page to its file offset if dirty.
    pub fn flush_page(&self, page_num: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush_page_locked(page_num)?;
        Ok(())
    }

    /// Writes every dirty cached page to its file offset.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let flushed = inner.flush_all_locked()?;
        trace!(flushed, "flushed dirty pages");
        Ok(())
    }

    /// Flushes everything, then fsyncs the file. Durable once it
    /// returns `Ok`.
    pub fn sync_file(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.flush_all_locked()?;
        inner.file.sync_all()?;
        Ok(())
    }

    /// Flushes, fsyncs, and releases every cached buffer.
    ///
    /// # Panics
    ///
    /// Panics if any page is still pinned; a live [`PageGuard`] across
    /// close would otherwise dangle.
    pub fn close(self) -> Result<()> {
        {
            let mut inner = self.inner.lock();
            let pinned = inner.cache.values().filter(|p| p.is_pinned()).count();
            assert!(
                pinned == 0,
                "pager closed with {pinned} outstanding pinned pages"
            );
            inner.flush_all_locked()?;
            inner.file.sync_all()?;
            inner.cache.clear();
            debug!("closed database file");
        }
        Ok(())
    }

    /// Number of pages currently cached. Diagnostic.
    pub fn cached_pages(&self) -> usize {
        self.inner.lock().cache.len()
    }

    /// Pin count of `page_num`, 0 if not cached. Diagnostic.
    pub fn pin_count(&self, page_num: u32) -> u32 {
        self.inner
            .lock()
            .cache
            .get(&page_num)
            .map(Page::pin_count)
            .unwrap_or(0)
    }

    /// Configured cache capacity in pages.
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if let Err(err) = inner.flush_all_locked() {
            warn!(%err, "flush on drop failed; dirty pages lost");
            return;
        }
        let _ = inner.file.sync_all();
    }
}

impl PagerInner {
    fn page_count(&self) -> u32 {
        (self.file_len / PAGE_SIZE as u64) as u32
    }

    /// Makes room for one more cache entry, evicting per the policy in
    /// the module docs.
    fn ensure_slot(&mut self) -> Result<()> {
        if self.cache.len() < self.capacity {
            return Ok(());
        }

        if self.evict_clean_unpinned() {
            return Ok(());
        }

        // No clean victim: flush the unpinned dirty pages, then rescan.
        let victims: Vec<u32> = self
            .cache
            .iter()
            .filter(|(_, p)| !p.is_pinned() && p.is_dirty())
            .map(|(&n, _)| n)
            .collect();
        for page_num in victims {
            self.flush_page_locked(page_num)?;
        }

        if self.evict_clean_unpinned() {
            return Ok(());
        }

        Err(Error::CacheFull {
            capacity: self.capacity,
        })
    }

    fn evict_clean_unpinned(&mut self) -> bool {
        let victim = self
            .cache
            .iter()
            .find(|(_, p)| !p.is_pinned() && !p.is_dirty())
            .map(|(&n, _)| n);
        match victim {
            Some(page_num) => {
                self.cache.remove(&page_num);
                trace!(page = page_num, "evicted page");
                true
            }
            None => false,
        }
    }

    fn flush_page_locked(&mut self, page_num: u32) -> Result<()> {
        let Some(page) = self.cache.get_mut(&page_num) else {
            return Ok(());
        };
        if !page.is_dirty() {
            return Ok(());
        }

        self.file
            .seek(SeekFrom::Start((page_num as u64 - 1) * PAGE_SIZE as u64))?;
        let data = page.data();
        let mut written = 0;
        while written < PAGE_SIZE {
            let n = self.file.write(&data[written..])?;
            if n == 0 {
                return Err(Error::ShortWrite {
                    page_num,
                    written,
                    expected: PAGE_SIZE,
                });
            }
            written += n;
        }
        page.clear_dirty();
        Ok(())
    }

    fn flush_all_locked(&mut self) -> Result<usize> {
        let dirty: Vec<u32> = self
            .cache
            .iter()
            .filter(|(_, p)| p.is_dirty())
            .map(|(&n, _)| n)
            .collect();
        let flushed = dirty.len();
        for page_num in dirty {
            self.flush_page_locked(page_num)?;
        }
        Ok(flushed)
    }
}

/// A pinned borrow of one cached page. Unpins on drop.
///
/// The guard stores a raw pointer to the page buffer rather than a
/// borrow of the cache map, so the pager's mutex is held only inside
/// individual calls, never across a caller's whole read.
pub struct PageGuard<'p> {
    pager: &'p Pager,
    page_num: u32,
    data: *mut u8,
}

impl PageGuard<'_> {
    pub fn page_num(&self) -> u32 {
        self.page_num
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: `data` points at a Box<[u8; PAGE_SIZE]> owned by the
        // cache entry for `page_num`. The entry holds a pin for this
        // guard, eviction never removes a pinned page, and the boxed
        // buffer's address is stable while the map rehashes, so the
        // pointer stays valid for the guard's lifetime.
        unsafe { std::slice::from_raw_parts(self.data, PAGE_SIZE) }
    }

    /// Mutable view of the page. Marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pager.mark_dirty(self.page_num);
        // SAFETY: validity as in `data`. Exclusivity holds because this
        // takes `&mut self` and callers follow the single-writer
        // contract: no two guards for the same page are mutated
        // concurrently.
        unsafe { std::slice::from_raw_parts_mut(self.data, PAGE_SIZE) }
    }

    /// Marks the page dirty without taking a mutable view.
    pub fn mark_dirty(&self) {
        self.pager.mark_dirty(self.page_num);
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pager.unpin_page(self.page_num);
    }
}
