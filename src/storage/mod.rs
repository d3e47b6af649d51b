//! # Storage Module
//!
//! The foundational storage layer: file I/O in page-sized blocks behind
//! a bounded cache with pin, dirty, and eviction discipline.
//!
//! ## Architecture Overview
//!
//! The database is a single file of 4 KiB pages. The [`Pager`] owns the
//! file handle and a capacity-bounded map of in-memory pages; callers
//! borrow pages through pinned [`PageGuard`]s and never see the file.
//!
//! ```text
//! ┌──────────────┐   get_page / allocate_page   ┌─────────────┐
//! │   B+tree,    │ ───────────────────────────> │    Pager    │
//! │   catalog    │ <─── PageGuard (pinned) ──── │  (1 mutex)  │
//! └──────────────┘                              └──────┬──────┘
//!                                                 seek + read/write
//!                                                      ▼
//!                                               database file
//! ```
//!
//! ## Safety Model
//!
//! A guard keeps its page pinned; pinned pages are never evicted and
//! their buffers are boxed, so the guard can hand out plain slices
//! without holding the pager's lock. Dirty pages are written back
//! before eviction, on [`Pager::flush_all`], and on drop.
//!
//! ## Module Organization
//!
//! - [`page`]: the cache entry (buffer + pin count + dirty flag)
//! - [`header`]: the 100-byte database header on page 1
//! - [`pager`]: the cache itself, eviction, and file I/O

pub mod header;
pub mod page;
pub mod pager;

pub use header::DbHeader;
pub use page::Page;
pub use pager::{PageGuard, Pager};
