//! Allocator implementations: the generic `Allocator` trait surface, the
//! `std::alloc::System` wrapper used as this crate's backing allocator, and
//! the Hoard-style concurrent allocator built on top of it.

mod heap;
mod superblock;
mod system;

pub mod hoard;

pub mod stats;
pub mod traits;

pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
pub use hoard::HoardAllocator;
pub use stats::{AllocatorStats, AtomicAllocatorStats, OptionalStats, StatisticsProvider};
#[cfg(feature = "std")]
pub use stats::BatchedStats;
pub use system::SystemAllocator;
pub use traits::{
    Allocator, BasicMemoryUsage, BulkAllocator, MemoryUsage, Resettable, ThreadSafeAllocator,
    TypedAllocExt,
};
