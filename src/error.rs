//! Allocation error type with diagnostics.
//!
//! A single error type covers every fallible path in this crate: the
//! `Allocator`-trait adapter, the large-allocation passthrough, and layout
//! validation. The core Hoard path itself (`HoardAllocator::allocate`/`free`)
//! cannot fail except by backing-allocator exhaustion, which is the only
//! place `AllocErrorKind::OutOfMemory` is ever produced from inside this
//! crate.

use core::alloc::Layout;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "std")]
use std::backtrace::{Backtrace, BacktraceStatus};

// ============================================================================
// Error statistics
// ============================================================================

/// Global error counters for monitoring.
pub struct ErrorStats {
    out_of_memory: AtomicU64,
    size_overflow: AtomicU64,
    invalid_alignment: AtomicU64,
    exceeds_max_size: AtomicU64,
    invalid_layout: AtomicU64,
    total_errors: AtomicU64,
}

impl ErrorStats {
    const fn new() -> Self {
        Self {
            out_of_memory: AtomicU64::new(0),
            size_overflow: AtomicU64::new(0),
            invalid_alignment: AtomicU64::new(0),
            exceeds_max_size: AtomicU64::new(0),
            invalid_layout: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    fn record(&self, kind: AllocErrorKind) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        match kind {
            AllocErrorKind::OutOfMemory => {
                self.out_of_memory.fetch_add(1, Ordering::Relaxed);
            }
            AllocErrorKind::SizeOverflow => {
                self.size_overflow.fetch_add(1, Ordering::Relaxed);
            }
            AllocErrorKind::InvalidAlignment => {
                self.invalid_alignment.fetch_add(1, Ordering::Relaxed);
            }
            AllocErrorKind::ExceedsMaxSize => {
                self.exceeds_max_size.fetch_add(1, Ordering::Relaxed);
            }
            AllocErrorKind::InvalidLayout => {
                self.invalid_layout.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn get_stats(&self) -> ErrorStatsSnapshot {
        ErrorStatsSnapshot {
            out_of_memory: self.out_of_memory.load(Ordering::Relaxed),
            size_overflow: self.size_overflow.load(Ordering::Relaxed),
            invalid_alignment: self.invalid_alignment.load(Ordering::Relaxed),
            exceeds_max_size: self.exceeds_max_size.load(Ordering::Relaxed),
            invalid_layout: self.invalid_layout.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.out_of_memory.store(0, Ordering::Relaxed);
        self.size_overflow.store(0, Ordering::Relaxed);
        self.invalid_alignment.store(0, Ordering::Relaxed);
        self.exceeds_max_size.store(0, Ordering::Relaxed);
        self.invalid_layout.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorStatsSnapshot {
    pub out_of_memory: u64,
    pub size_overflow: u64,
    pub invalid_alignment: u64,
    pub exceeds_max_size: u64,
    pub invalid_layout: u64,
    pub total_errors: u64,
}

/// Process-wide error statistics instance.
pub static ERROR_STATS: ErrorStats = ErrorStats::new();

// ============================================================================
// Error context
// ============================================================================

/// Additional context attached to an allocation error.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: Option<&'static str>,
    pub location: Option<&'static core::panic::Location<'static>>,
    #[cfg(feature = "std")]
    pub thread_id: Option<std::thread::ThreadId>,
    #[cfg(feature = "std")]
    pub timestamp: Option<std::time::SystemTime>,
    pub memory_state: Option<MemoryState>,
}

impl ErrorContext {
    pub const fn new() -> Self {
        Self {
            message: None,
            location: None,
            #[cfg(feature = "std")]
            thread_id: None,
            #[cfg(feature = "std")]
            timestamp: None,
            memory_state: None,
        }
    }

    #[track_caller]
    pub fn with_caller() -> Self {
        Self {
            message: None,
            location: Some(core::panic::Location::caller()),
            #[cfg(feature = "std")]
            thread_id: Some(std::thread::current().id()),
            #[cfg(feature = "std")]
            timestamp: Some(std::time::SystemTime::now()),
            memory_state: None,
        }
    }

    pub fn with_memory_state(mut self, state: MemoryState) -> Self {
        self.memory_state = Some(state);
        self
    }
}

/// Best-effort system memory snapshot at the time of an error.
#[derive(Debug, Clone, Copy)]
pub struct MemoryState {
    pub available: Option<usize>,
    pub total: Option<usize>,
    pub process_used: Option<usize>,
    pub active_allocations: Option<usize>,
}

impl MemoryState {
    pub const fn new() -> Self {
        Self {
            available: None,
            total: None,
            process_used: None,
            active_allocations: None,
        }
    }

    #[cfg(feature = "std")]
    pub fn capture() -> Self {
        Self::new()
    }
}

// ============================================================================
// Error kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// The backing allocator returned null.
    OutOfMemory,
    /// A size computation (e.g. `layout.size() * count`) overflowed.
    SizeOverflow,
    /// Requested alignment was not a power of two.
    InvalidAlignment,
    /// Requested size exceeds this allocator's supported maximum.
    ExceedsMaxSize,
    /// `Layout::from_size_align`/`Layout::array` rejected the parameters.
    InvalidLayout,
}

impl AllocErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::OutOfMemory => "out of memory",
            AllocErrorKind::SizeOverflow => "size overflow",
            AllocErrorKind::InvalidAlignment => "invalid alignment",
            AllocErrorKind::ExceedsMaxSize => "exceeds maximum allocation size",
            AllocErrorKind::InvalidLayout => "invalid layout",
        }
    }

    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            AllocErrorKind::OutOfMemory => ErrorSeverity::Critical,
            AllocErrorKind::SizeOverflow => ErrorSeverity::Error,
            AllocErrorKind::InvalidAlignment => ErrorSeverity::Error,
            AllocErrorKind::ExceedsMaxSize => ErrorSeverity::Warning,
            AllocErrorKind::InvalidLayout => ErrorSeverity::Error,
        }
    }

    pub const fn recovery_hint(&self) -> &'static str {
        match self {
            AllocErrorKind::OutOfMemory => "free memory or increase system resources",
            AllocErrorKind::SizeOverflow => "reduce allocation size or split into smaller allocations",
            AllocErrorKind::InvalidAlignment => "ensure alignment is a power of two",
            AllocErrorKind::ExceedsMaxSize => "split allocation into smaller chunks",
            AllocErrorKind::InvalidLayout => "check layout parameters for validity",
        }
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Critical,
}

// ============================================================================
// AllocError
// ============================================================================

#[derive(Debug, Clone)]
pub struct AllocError {
    kind: AllocErrorKind,
    layout: Option<Layout>,
    context: Option<Box<ErrorContext>>,
    #[cfg(feature = "std")]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    #[cfg(feature = "std")]
    backtrace: Option<Backtrace>,
}

impl AllocError {
    #[inline]
    pub fn new() -> Self {
        Self::new_with_kind(AllocErrorKind::OutOfMemory)
    }

    #[inline]
    pub fn new_with_kind(kind: AllocErrorKind) -> Self {
        ERROR_STATS.record(kind);
        Self {
            kind,
            layout: None,
            context: None,
            #[cfg(feature = "std")]
            source: None,
            #[cfg(feature = "std")]
            backtrace: capture_backtrace(),
        }
    }

    #[inline]
    pub fn with_layout(layout: Layout) -> Self {
        ERROR_STATS.record(AllocErrorKind::OutOfMemory);
        Self {
            kind: AllocErrorKind::OutOfMemory,
            layout: Some(layout),
            context: None,
            #[cfg(feature = "std")]
            source: None,
            #[cfg(feature = "std")]
            backtrace: capture_backtrace(),
        }
    }

    #[inline]
    #[track_caller]
    pub fn with_kind_and_layout(kind: AllocErrorKind, layout: Layout) -> Self {
        ERROR_STATS.record(kind);
        Self {
            kind,
            layout: Some(layout),
            context: Some(Box::new(ErrorContext::with_caller())),
            #[cfg(feature = "std")]
            source: None,
            #[cfg(feature = "std")]
            backtrace: capture_backtrace(),
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(Box::new(context));
        self
    }

    #[inline]
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    #[inline]
    pub const fn layout(&self) -> Option<Layout> {
        self.layout
    }

    #[inline]
    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_deref()
    }

    #[inline]
    pub const fn severity(&self) -> ErrorSeverity {
        self.kind.severity()
    }

    #[inline]
    pub const fn recovery_hint(&self) -> &'static str {
        self.kind.recovery_hint()
    }

    #[inline]
    pub const fn has_layout(&self) -> bool {
        self.layout.is_some()
    }

    #[inline]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.kind, AllocErrorKind::OutOfMemory)
    }

    #[inline]
    pub const fn is_size_overflow(&self) -> bool {
        matches!(self.kind, AllocErrorKind::SizeOverflow)
    }

    #[inline]
    pub const fn is_invalid_alignment(&self) -> bool {
        matches!(self.kind, AllocErrorKind::InvalidAlignment)
    }

    #[inline]
    pub const fn is_critical(&self) -> bool {
        matches!(self.severity(), ErrorSeverity::Critical)
    }

    #[cfg(feature = "std")]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_ref()
    }

    /// Creates an allocation error for a specific size and alignment.
    #[inline]
    pub fn for_size_align(size: usize, align: usize) -> Self {
        match Layout::from_size_align(size, align) {
            Ok(layout) => Self::with_layout(layout),
            Err(_) => Self::new_with_kind(AllocErrorKind::InvalidAlignment),
        }
    }

    #[cfg(feature = "std")]
    #[track_caller]
    pub fn out_of_memory_detailed(layout: Layout) -> Self {
        Self::with_kind_and_layout(AllocErrorKind::OutOfMemory, layout)
            .with_context(ErrorContext::with_caller().with_memory_state(MemoryState::capture()))
    }
}

#[cfg(feature = "std")]
fn capture_backtrace() -> Option<Backtrace> {
    let bt = Backtrace::capture();
    if bt.status() == BacktraceStatus::Captured {
        Some(bt)
    } else {
        None
    }
}

#[cfg(not(feature = "std"))]
fn capture_backtrace() {}

impl Default for AllocError {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            Some(layout) => write!(
                f,
                "memory allocation failed ({}): could not allocate {} bytes with alignment {}",
                self.kind,
                layout.size(),
                layout.align()
            ),
            None => write!(f, "memory allocation failed ({})", self.kind),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_detailed_collects_context() {
        let error = AllocError::out_of_memory_detailed(Layout::new::<u64>());

        assert_eq!(error.kind(), AllocErrorKind::OutOfMemory);
        assert!(error.has_layout());
        assert!(error.context().is_some());
    }

    #[test]
    fn error_stats_increment() {
        ERROR_STATS.reset();
        let _e1 = AllocError::new_with_kind(AllocErrorKind::OutOfMemory);
        let _e2 = AllocError::new_with_kind(AllocErrorKind::SizeOverflow);
        let stats = ERROR_STATS.get_stats();
        assert!(stats.total_errors >= 2);
    }

    #[test]
    fn out_of_memory_is_critical() {
        let oom = AllocError::new_with_kind(AllocErrorKind::OutOfMemory);
        assert!(oom.is_critical());

        let overflow = AllocError::new_with_kind(AllocErrorKind::SizeOverflow);
        assert!(!overflow.is_critical());
    }
}
