use thiserror::Error;

/// Failure modes of the cothread runtime (C2).
#[derive(Debug, Error)]
pub enum CothreadError {
    /// The context's fixed-capacity cothread arena is already full.
    #[error("cothread context is at capacity ({capacity} slots)")]
    CapacityExceeded { capacity: usize },

    /// `mmap`/`mprotect` failed while reserving a guarded stack region.
    #[error("failed to allocate a cothread stack: {0}")]
    StackAllocFailed(#[source] std::io::Error),

    /// `switch()` was asked to jump to a null or foreign-context cothread.
    #[error("switch target is invalid or belongs to a different context")]
    InvalidTarget,
}
