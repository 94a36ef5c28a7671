//! # hoard-alloc
//!
//! A general-purpose concurrent memory allocator in the Hoard lineage:
//! per-thread local heaps backed by size-classed superblocks, with a
//! global heap that absorbs mostly-empty superblocks released by local
//! heaps so memory a dying thread frees can be reused by another.
//!
//! The two-function surface is deliberately small:
//!
//! ```
//! let p = hoard_alloc::alloc(64);
//! assert!(!p.is_null());
//! unsafe { hoard_alloc::free(p) };
//! ```
//!
//! For use as a generic `Allocator` (to back collections, arenas, or a
//! `#[global_allocator]`), see [`allocator::HoardAllocator`].

pub mod allocator;
pub mod config;
pub mod error;
pub mod singleton;
pub mod utils;

pub use allocator::{AllocError, AllocErrorKind, AllocResult, HoardAllocator};
pub use config::HoardConfig;
pub use singleton::{alloc, free};
