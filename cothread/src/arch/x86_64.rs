//! Arch stack primitive (C1), x86_64 only.
//!
//! Grounded in the callee-saved-register save/restore scheme of
//! `kernel/src/task/{context.rs,local_scheduler.rs}`: no `setjmp`/
//! `longjmp`, just hand-written `naked_asm!` that pushes/pops the six
//! callee-saved GPRs plus `rflags` and swaps `rsp`.

use core::arch::naked_asm;

/// Saved machine state for one cothread. Field order is load-bearing —
/// `context_switch` addresses fields by byte offset, not by name.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Regs {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub rbx: usize,
    pub rbp: usize,
    pub rsp: usize,
    pub rflags: usize,
    pub rip: usize,
}

impl Regs {
    /// Build the initial state for a cothread that has never run: its
    /// instruction pointer is the trampoline entry, its stack pointer is
    /// the top of its freshly-allocated (and as-yet untouched) stack.
    ///
    /// `context_switch` reaches the entry point via `jmp`, not `call`, so
    /// the usual "return address just got pushed" adjustment never
    /// happens on its own. The SysV ABI expects `rsp % 16 == 8` at a
    /// function's first instruction (as it would be immediately after a
    /// `call` off a 16-aligned stack); `stack_top` is page-aligned, so
    /// `rsp % 16 == 0` there, and this subtracts 8 to match what the
    /// callee expects, the same adjustment `context_switch`'s `call`-free
    /// jump into a freshly started cothread requires.
    pub fn fresh(stack_top: usize, entry: extern "C" fn() -> !) -> Regs {
        Regs {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            rbx: 0,
            rbp: 0,
            rsp: stack_top - 8,
            rflags: 0,
            rip: entry as usize,
        }
    }
}

/// Save the caller's callee-saved registers into `*old`, then load and
/// jump into `*new`. Returns (to the original caller of `context_switch`)
/// only once some later `context_switch` call restores `old` again.
///
/// # Safety
/// `old` must point to valid, writable storage for the duration of the
/// call; `new` must have been produced by [`Regs::fresh`] or by a
/// previous save through this same function, and its `rsp` must still
/// point into a live, currently-unused stack.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(old: *mut Regs, new: *const Regs) {
    naked_asm!(
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbx",
        "mov [rdi + 0x28], rbp",
        "mov [rdi + 0x30], rsp",
        "pushfq",
        "pop qword ptr [rdi + 0x38]",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x40], rax",
        "mov r15, [rsi + 0x00]",
        "mov r14, [rsi + 0x08]",
        "mov r13, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov rbx, [rsi + 0x20]",
        "mov rbp, [rsi + 0x28]",
        "mov rsp, [rsi + 0x30]",
        "push qword ptr [rsi + 0x38]",
        "popfq",
        "jmp qword ptr [rsi + 0x40]",
        "2:",
        "ret",
    );
}

/// Return an address within the calling frame's activation record.
/// Diagnostic only — used by `scheduler_show` to report approximate
/// stack depth, never by control flow.
pub fn current_stack_frame() -> usize {
    let rbp: usize;
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }
    rbp
}

/// Platform-specific massaging of a freshly allocated stack before its
/// first use. The System V AMD64 ABI has no back-chain requirement (that
/// is a PowerPC/AIX convention), so this is a documented no-op on x86_64.
pub fn setup_stack(top: usize) -> usize {
    top
}

/// Switch the machine stack pointer to `sp` and transfer control to `f`,
/// which must never return. Used only to stand up a brand-new OS-level
/// stack outside of the `Regs`/`context_switch` bookkeeping (e.g. in
/// tests exercising C1 in isolation); the cothread runtime itself always
/// goes through `context_switch` so that the jump target is uniformly
/// `Regs::rip`, whether that is a fresh trampoline or a resume point.
///
/// # Safety
/// `sp` must be the top of a valid, sufficiently large stack region.
#[unsafe(naked)]
pub unsafe extern "C" fn set_sp_and_call(sp: usize, f: extern "C" fn() -> !) {
    naked_asm!("mov rsp, rdi", "jmp rsi");
}
