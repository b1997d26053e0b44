//! Arch stack primitive (C1). Only x86_64 is implemented; other targets
//! fail to compile with a clear message rather than silently falling
//! back to a slower or incorrect strategy (see `SPEC_FULL.md` §0).

#[cfg(all(target_arch = "x86_64", unix))]
mod x86_64;

#[cfg(all(target_arch = "x86_64", unix))]
pub use self::x86_64::*;

#[cfg(not(target_arch = "x86_64"))]
compile_error!(
    "cothread only implements the arch stack primitive for x86_64; \
     the source historically also supported PowerPC, but this \
     reimplementation deliberately covers one architecture fully \
     rather than several partially"
);

#[cfg(all(target_arch = "x86_64", not(unix)))]
compile_error!(
    "cothread's stack allocator (crate::stack::Stack) is mmap-based and \
     unix-only; porting to a non-unix x86_64 target also needs a \
     VirtualAlloc-backed Stack impl, which is out of scope here"
);
