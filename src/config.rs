//! Process-wide tunables for the Hoard allocator.
//!
//! Mirrors the teacher's lazily-initialized global configuration pattern:
//! a plain `Default`-able struct, validated on construction, published once
//! behind `std::sync::OnceLock` and read by every thread thereafter.

use std::sync::OnceLock;

use crate::utils::is_power_of_two;

/// Default superblock size: `1 << 15` (32 KiB), matching the reference
/// configuration.
pub const DEFAULT_SB_SIZE: usize = 1 << 15;

/// Tunables for a [`HoardAllocator`](crate::allocator::hoard::HoardAllocator).
///
/// - `sb_size` must be a power of two; every size-classed superblock is
///   exactly this many bytes of payload.
/// - `local_heaps` must be at least 1; it is the number of per-thread-hash
///   local heaps, in addition to the single global heap at index 0.
#[derive(Debug, Clone, Copy)]
pub struct HoardConfig {
    pub sb_size: usize,
    pub local_heaps: usize,
}

impl HoardConfig {
    /// Builds a config, clamping invalid values to the nearest legal one
    /// rather than panicking — this runs at process startup, where a panic
    /// would be maximally disruptive for a library whose whole job is to
    /// stay up.
    pub fn new(sb_size: usize, local_heaps: usize) -> Self {
        let sb_size = if is_power_of_two(sb_size) { sb_size } else { DEFAULT_SB_SIZE };
        let local_heaps = local_heaps.max(1);
        Self { sb_size, local_heaps }
    }

    /// `M = max(2 * available_parallelism(), 1)`, per the reference
    /// configuration's sizing rule.
    pub fn with_sb_size(sb_size: usize) -> Self {
        Self::new(sb_size, default_local_heap_count())
    }
}

impl Default for HoardConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SB_SIZE, default_local_heap_count())
    }
}

/// `2 * hardware_concurrency`, falling back to 4 threads' worth when the
/// platform can't report parallelism (containers with restrictive cgroups,
/// some embedded targets).
pub fn default_local_heap_count() -> usize {
    let cpus = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
    (cpus * 2).max(1)
}

static GLOBAL_CONFIG: OnceLock<HoardConfig> = OnceLock::new();

/// Returns the process-wide configuration, initializing it with defaults on
/// first access. Once any thread has read this (including indirectly, via
/// the [`crate::singleton`] allocator), the configuration is fixed for the
/// life of the process.
pub fn global_config() -> &'static HoardConfig {
    GLOBAL_CONFIG.get_or_init(HoardConfig::default)
}

/// Installs a configuration before the allocator singleton is first used.
///
/// Returns `Err(existing)` if the global configuration was already
/// initialized (by a prior call to this function or to
/// [`global_config`]/first allocation) — the config cannot be changed once
/// the allocator has started serving memory.
pub fn set_global_config(config: HoardConfig) -> Result<(), HoardConfig> {
    GLOBAL_CONFIG.set(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_sb_size() {
        let config = HoardConfig::new(12345, 4);
        assert_eq!(config.sb_size, DEFAULT_SB_SIZE);
    }

    #[test]
    fn clamps_zero_heaps_to_one() {
        let config = HoardConfig::new(DEFAULT_SB_SIZE, 0);
        assert_eq!(config.local_heaps, 1);
    }

    #[test]
    fn default_local_heap_count_is_at_least_one() {
        assert!(default_local_heap_count() >= 1);
    }
}
