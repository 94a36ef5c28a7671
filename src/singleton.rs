//! Process-wide [`HoardAllocator`] singleton and the raw `alloc`/`free`
//! free functions (C4).
//!
//! Mirrors the teacher's lazy global pattern from `config.rs`
//! (`std::sync::OnceLock`, initialized on first use from
//! [`crate::config::global_config`]), exposing the distilled spec's exact
//! two-function surface: `alloc(size) -> *mut u8`, `free(ptr)`.

use std::sync::OnceLock;

use crate::allocator::hoard::HoardAllocator;
use crate::config;

static ALLOCATOR: OnceLock<HoardAllocator> = OnceLock::new();

fn instance() -> &'static HoardAllocator {
    ALLOCATOR.get_or_init(|| HoardAllocator::new(*config::global_config()))
}

/// Allocates `size` bytes from the process-wide Hoard allocator. Returns
/// null on backing-allocator exhaustion. `size == 0` returns a real,
/// distinct, freeable pointer (SPEC_FULL.md §4.3, resolved Open Question 2).
pub fn alloc(size: usize) -> *mut u8 {
    instance().allocate(size)
}

/// Frees a pointer previously returned by [`alloc`] on this process.
///
/// # Safety
/// `ptr` must have been returned by [`alloc`] and not freed since. Passing
/// a foreign pointer or double-freeing is undefined behavior (SPEC_FULL.md
/// §7).
pub unsafe fn free(ptr: *mut u8) {
    // SAFETY: forwarded from caller's contract.
    unsafe { instance().free(ptr) };
}

/// Returns a handle to the process-wide allocator, e.g. to implement the
/// crate's `Allocator` trait or a `#[global_allocator]` adapter against a
/// single shared instance instead of calling the free functions directly.
pub fn shared() -> &'static HoardAllocator {
    instance()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_round_trips() {
        let p = alloc(128);
        assert!(!p.is_null());
        unsafe {
            p.write_bytes(0xab, 128);
            assert_eq!(*p, 0xab);
            free(p);
        }
    }

    #[test]
    fn repeated_alloc_returns_distinct_pointers() {
        let a = alloc(16);
        let b = alloc(16);
        assert_ne!(a, b);
        unsafe {
            free(a);
            free(b);
        }
    }

    #[test]
    fn zero_size_alloc_is_never_null() {
        let p = alloc(0);
        assert!(!p.is_null());
        unsafe { free(p) };
    }
}
