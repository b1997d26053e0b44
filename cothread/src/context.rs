//! Cothread runtime (C2): create, switch between, and destroy fixed-stack
//! cooperative coroutines within one OS thread.
//!
//! Grounded in `kernel/src/task/{process.rs,task.rs}` (per-task saved
//! register context + stack) and `global_scheduler.rs`'s
//! `Mutex<BTreeMap<TaskId, Arc<Task>>>` registry idiom, adapted here to a
//! single fixed-capacity arena local to one `Context` rather than a
//! process-wide table, since a cothread never outlives the context that
//! created it.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::arch::{self, Regs};
use crate::error::CothreadError;
use crate::stack::Stack;

/// Default per-cothread stack size. The source's `STACK_SIZE` default is
/// platform-dependent (8 KiB-256 KiB); this picks the middle of that
/// range as a default that `ContextConfig` callers can override.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Default cap on the number of cothreads in one context, matching the
/// source's `COTHREAD_MAXTHREADS`.
pub const DEFAULT_MAX_COTHREADS: usize = 16;

thread_local! {
    static CURRENT: Cell<*mut Context> = const { Cell::new(std::ptr::null_mut()) };
}

/// Tunables for a [`Context`]. See `SPEC_FULL.md` §1: the source hardcodes
/// these as compile-time constants; this reimplementation exposes them as
/// constructor parameters since a host embedding the scheduler reasonably
/// wants to tune them per graph.
#[derive(Debug, Clone, Copy)]
pub struct ContextConfig {
    pub stack_size: usize,
    pub max_cothreads: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            stack_size: DEFAULT_STACK_SIZE,
            max_cothreads: DEFAULT_MAX_COTHREADS,
        }
    }
}

type CothreadFn = Box<dyn FnMut()>;

struct Slot {
    regs: Regs,
    stack: Option<Stack>,
    started: bool,
    live: bool,
    generation: u32,
    func: Option<CothreadFn>,
    /// Per-cothread lock slot (spec §4.2): an atomic word is sufficient
    /// since contention only matters across OS threads, and the only
    /// cross-thread path into this runtime is the async op queue in C3,
    /// which has its own mutex. Toggled around `context_switch` so an
    /// external observer always sees exactly one locked slot.
    locked: AtomicBool,
    data: HashMap<&'static str, Box<dyn Any + Send>>,
    name: Option<String>,
}

impl Slot {
    fn caller_slot() -> Slot {
        Slot {
            regs: Regs::default(),
            stack: None,
            started: true,
            live: true,
            generation: 0,
            func: None,
            locked: AtomicBool::new(true),
            data: HashMap::new(),
            name: Some("main".to_string()),
        }
    }
}

/// A handle to one cothread within a [`Context`]. Cheap to copy; becomes
/// stale (and rejected with [`CothreadError::InvalidTarget`]) once the
/// slot it names is destroyed and recycled, thanks to the generation
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cothread {
    index: usize,
    generation: u32,
}

/// A fixed-capacity set of cothreads that can switch into each other.
/// Index 0 is always the "main" cothread, representing the OS thread
/// that called [`Context::init`]; it is never destroyed.
pub struct Context {
    slots: Vec<Slot>,
    capacity: usize,
    current: usize,
    free: Vec<usize>,
    stack_size: usize,
}

impl Context {
    /// Creates a context with one pre-populated cothread (index 0)
    /// representing the caller. Does not install the thread-local by
    /// itself — call [`Context::activate`] before running any cothread
    /// body that needs to recover its context (the scheduler does this
    /// once per `iterate()`, per `SPEC_FULL.md` §9).
    pub fn init(config: ContextConfig) -> Box<Context> {
        let mut slots = Vec::with_capacity(config.max_cothreads);
        slots.push(Slot::caller_slot());
        Box::new(Context {
            slots,
            capacity: config.max_cothreads,
            current: 0,
            free: Vec::new(),
            stack_size: config.stack_size,
        })
    }

    /// Installs this context as the thread-local current context for the
    /// calling OS thread. Must be paired with [`Context::deactivate`].
    pub fn activate(&mut self) {
        CURRENT.with(|c| c.set(self as *mut Context));
    }

    /// Clears the thread-local current-context pointer, if it currently
    /// points at this context.
    pub fn deactivate(&mut self) {
        CURRENT.with(|c| {
            if c.get() == self as *mut Context {
                c.set(std::ptr::null_mut());
            }
        });
    }

    fn with_current<R>(f: impl FnOnce(&mut Context) -> R) -> R {
        CURRENT.with(|c| {
            let ptr = c.get();
            assert!(
                !ptr.is_null(),
                "cothread trampoline ran without an active Context on this OS thread"
            );
            // SAFETY: the pointer was installed by `activate` and is
            // cleared by `deactivate` before the `Context` it points to
            // can be dropped, and cothread bodies only ever run on the
            // OS thread that activated their context.
            f(unsafe { &mut *ptr })
        })
    }

    pub fn main(&self) -> Cothread {
        Cothread {
            index: 0,
            generation: self.slots[0].generation,
        }
    }

    pub fn current(&self) -> Cothread {
        Cothread {
            index: self.current,
            generation: self.slots[self.current].generation,
        }
    }

    /// Allocates a stack slice from the context's reserved region,
    /// returning a not-yet-started cothread. Fails once `max_cothreads`
    /// live cothreads already exist.
    pub fn create(&mut self) -> Result<Cothread, CothreadError> {
        let index = if let Some(index) = self.free.pop() {
            index
        } else if self.slots.len() < self.capacity {
            self.slots.len()
        } else {
            return Err(CothreadError::CapacityExceeded {
                capacity: self.capacity,
            });
        };

        let stack = Stack::new(self.stack_size)?;
        let slot = Slot {
            regs: Regs::default(),
            stack: Some(stack),
            started: false,
            live: true,
            generation: if index < self.slots.len() {
                self.slots[index].generation.wrapping_add(1)
            } else {
                0
            },
            func: None,
            locked: AtomicBool::new(false),
            data: HashMap::new(),
            name: None,
        };

        if index < self.slots.len() {
            self.slots[index] = slot;
        } else {
            self.slots.push(slot);
        }

        log::debug!("cothread: created slot {index}");
        Ok(Cothread {
            index,
            generation: self.slots[index].generation,
        })
    }

    fn resolve(&self, t: Cothread) -> Result<usize, CothreadError> {
        let slot = self.slots.get(t.index).ok_or(CothreadError::InvalidTarget)?;
        if !slot.live || slot.generation != t.generation {
            return Err(CothreadError::InvalidTarget);
        }
        Ok(t.index)
    }

    /// Binds the function `t` will execute when first switched to (or
    /// next switched to, if `t` previously completed). May be called
    /// before the first switch or after completion to recycle a slot.
    pub fn setfunc(&mut self, t: Cothread, f: impl FnMut() + 'static) -> Result<(), CothreadError> {
        let index = self.resolve(t)?;
        self.slots[index].func = Some(Box::new(f));
        self.slots[index].started = false;
        Ok(())
    }

    pub fn set_name(&mut self, t: Cothread, name: impl Into<String>) -> Result<(), CothreadError> {
        let index = self.resolve(t)?;
        self.slots[index].name = Some(name.into());
        Ok(())
    }

    pub fn name(&self, t: Cothread) -> Option<&str> {
        self.slots.get(t.index).and_then(|s| s.name.as_deref())
    }

    /// Reads `t`'s per-cothread lock slot (spec §4.2): `true` while `t`
    /// is the one currently holding the machine's registers, i.e. while
    /// it is current or mid-switch-in. Diagnostic only, for
    /// `scheduler::Scheduler::show` — no control path in this crate
    /// blocks on it, since a single OS thread drives a given `Context`.
    pub fn is_locked(&self, t: Cothread) -> bool {
        self.slots
            .get(t.index)
            .map(|s| s.locked.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn set_data(&mut self, t: Cothread, key: &'static str, value: Box<dyn Any + Send>) -> Result<(), CothreadError> {
        let index = self.resolve(t)?;
        self.slots[index].data.insert(key, value);
        Ok(())
    }

    pub fn get_data(&self, t: Cothread, key: &str) -> Option<&(dyn Any + Send)> {
        self.slots
            .get(t.index)
            .and_then(|s| s.data.get(key))
            .map(|b| b.as_ref())
    }

    /// Cooperatively transfers control to `target`. A no-op (with a
    /// logged diagnostic) if `target` is already current.
    pub fn switch(&mut self, target: Cothread) -> Result<(), CothreadError> {
        let to = self.resolve(target)?;
        if to == self.current {
            log::warn!("cothread: switch to self ({to}) is a no-op");
            return Ok(());
        }

        let from = self.current;
        if !self.slots[to].started {
            let stack_top = self.slots[to]
                .stack
                .as_ref()
                .expect("non-main cothread always owns a stack")
                .top();
            let stack_top = arch::setup_stack(stack_top);
            self.slots[to].regs = Regs::fresh(stack_top, trampoline_entry);
            self.slots[to].started = true;
        }

        self.current = to;
        let from_regs: *mut Regs = &mut self.slots[from].regs;
        let to_regs: *const Regs = &self.slots[to].regs;

        // Release A's lock (state is about to be saved by context_switch
        // itself) and acquire B's before restoring it.
        self.slots[from].locked.store(false, Ordering::Release);
        self.slots[to].locked.store(true, Ordering::Acquire);

        // SAFETY: `from_regs` is valid storage owned by this context and
        // outlives the call; `to_regs` was populated either just above
        // (fresh) or by a previous `context_switch` save (resume), and
        // its `rsp` points into a stack owned by this context.
        unsafe {
            arch::context_switch(from_regs, to_regs);
        }
        Ok(())
    }

    /// Releases the stack and bookkeeping for `t`. Must not be called on
    /// the current cothread.
    pub fn destroy(&mut self, t: Cothread) -> Result<(), CothreadError> {
        let index = self.resolve(t)?;
        if index == self.current {
            return Err(CothreadError::InvalidTarget);
        }
        let slot = &mut self.slots[index];
        slot.stack = None;
        slot.func = None;
        slot.data.clear();
        slot.live = false;
        self.free.push(index);
        log::debug!("cothread: destroyed slot {index}");
        Ok(())
    }

    fn take_func(&mut self, index: usize) -> Option<CothreadFn> {
        self.slots[index].func.take()
    }

    fn mark_completed(&mut self, index: usize) {
        self.slots[index].started = false;
    }

    fn main_regs_ptr(&mut self) -> *const Regs {
        &self.slots[0].regs
    }
}

/// The single trampoline every fresh cothread's `rip` points at. Mirrors
/// `cothread_stub` in the source: it never returns to its caller in the
/// ordinary sense — it loops, invoking whatever function is currently
/// bound via `setfunc`, and switches back to the main cothread when that
/// function returns (so the cothread can be recycled by a later
/// `setfunc` + `switch`, or simply left idle).
extern "C" fn trampoline_entry() -> ! {
    loop {
        Context::with_current(|ctx| {
            let index = ctx.current;
            if let Some(mut f) = ctx.take_func(index) {
                f();
            }
            ctx.mark_completed(index);
            let main_regs = ctx.main_regs_ptr();
            let my_regs: *mut Regs = &mut ctx.slots[index].regs;
            ctx.current = 0;
            ctx.slots[index].locked.store(false, Ordering::Release);
            ctx.slots[0].locked.store(true, Ordering::Acquire);
            // SAFETY: same contract as `Context::switch`, just with the
            // from/to sides fixed to "myself" and "main".
            unsafe {
                arch::context_switch(my_regs, main_regs);
            }
        });
    }
}
