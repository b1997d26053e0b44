use crate::error::CothreadError;

/// Smallest stack this crate will ever hand out, regardless of what the
/// caller requests. Mirrors the source's lower bound on `STACK_SIZE`.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// An `mmap`-backed stack with a leading guard page.
///
/// Always allocated via `mmap` + `mprotect`, never `malloc` — see the
/// Open Question resolution in `DESIGN.md`: the original's
/// `pthread_self() == 0` branch between `malloc` and aligned `mmap` is
/// collapsed to "always mmap".
pub struct Stack {
    base: *mut u8,
    mmap_len: usize,
    usable_len: usize,
}

// The region is exclusively owned by whichever cothread currently holds
// this `Stack`; ownership transfers, it is never aliased.
unsafe impl Send for Stack {}

impl Stack {
    pub fn new(size: usize) -> Result<Self, CothreadError> {
        let size = size.max(MIN_STACK_SIZE);
        let page_size = page_size();
        let mmap_len = round_up(size, page_size) + page_size;

        unsafe {
            let base = libc::mmap(
                std::ptr::null_mut(),
                mmap_len,
                libc::PROT_NONE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            );
            if base == libc::MAP_FAILED {
                return Err(CothreadError::StackAllocFailed(std::io::Error::last_os_error()));
            }

            let usable_len = mmap_len - page_size;
            let usable_base = base.cast::<u8>().add(page_size);
            if libc::mprotect(
                usable_base.cast(),
                usable_len,
                libc::PROT_READ | libc::PROT_WRITE,
            ) != 0
            {
                let err = std::io::Error::last_os_error();
                libc::munmap(base, mmap_len);
                return Err(CothreadError::StackAllocFailed(err));
            }

            Ok(Stack {
                base: base.cast(),
                mmap_len,
                usable_len,
            })
        }
    }

    /// Address one past the top of the usable (writable) region. Stacks
    /// on x86_64 grow down, so this is the initial stack pointer.
    pub fn top(&self) -> usize {
        self.base as usize + self.mmap_len
    }

    pub fn bottom(&self) -> usize {
        self.top() - self.usable_len
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            let ret = libc::munmap(self.base.cast(), self.mmap_len);
            debug_assert_eq!(ret, 0, "munmap of cothread stack failed");
        }
    }
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    debug_assert!(size > 0);
    size as usize
}

fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
