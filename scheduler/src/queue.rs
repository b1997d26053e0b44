//! Cothread queue with async operations (C3), fair-scheduler variant.
//!
//! Grounded in `examples/original_source/gst/schedulers/faircothreads.c`:
//! `cothread_activate`/`cothread_deactivate` become run-list push/remove,
//! `queue_async_op` becomes [`CothreadQueue::change_state_async`] /
//! [`CothreadQueue::awake_async`], and
//! `gst_fair_scheduler_cothread_queue_iterate` becomes
//! [`CothreadQueue::iterate`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cothread::{Context, ContextConfig, Cothread};

use crate::error::Error;

/// How long `iterate()` waits on the async-op condvar before giving up
/// and reporting no progress, matching the source's
/// `g_time_val_add(&timeout, 5000)` (microseconds -> 5 ms).
pub const ASYNC_WAIT_TIMEOUT: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CothreadState {
    Stopped,
    Suspended,
    Running,
}

struct Entry {
    state: CothreadState,
    sleeping: bool,
    /// Set by [`CothreadQueue::sleep`] when the caller wants the mutex it
    /// held re-acquired on its behalf the next time this cothread is
    /// switched into (the source's `cothread_sleep_mutex` semantics).
    deferred_mutex: Option<Arc<Mutex<()>>>,
    /// Set by [`CothreadQueue::request_cancel`], cleared by the first
    /// [`CothreadQueue::take_cancelled`] call that observes it. Lives here
    /// rather than in whatever primitive the cothread happened to be
    /// blocked in, so a cancellation is never tied to one specific wait.
    cancel_requested: bool,
}

enum AsyncOp {
    ChangeState(Cothread, CothreadState),
    Awake(Cothread, i32),
}

/// A run list of cothreads plus a mutex+condvar guarded queue of async
/// operations foreign OS threads may post.
pub struct CothreadQueue {
    context: Option<Box<Context>>,
    run_list: VecDeque<Cothread>,
    entries: HashMap<Cothread, Entry>,
    async_ops: Arc<(Mutex<VecDeque<AsyncOp>>, Condvar)>,
    config: ContextConfig,
}

impl CothreadQueue {
    /// Empty queue; the underlying cothread context is not created yet.
    pub fn create(config: ContextConfig) -> CothreadQueue {
        CothreadQueue {
            context: None,
            run_list: VecDeque::new(),
            entries: HashMap::new(),
            async_ops: Arc::new((Mutex::new(VecDeque::new()), Condvar::new())),
            config,
        }
    }

    /// Lazily instantiates the underlying cothread context.
    pub fn start(&mut self) {
        if self.context.is_none() {
            self.context = Some(Context::init(self.config));
        }
    }

    /// Destroys the context and every cothread in it.
    pub fn stop(&mut self) {
        self.context = None;
        self.run_list.clear();
        self.entries.clear();
    }

    pub fn context(&self) -> &Context {
        self.context.as_ref().expect("CothreadQueue::start was not called")
    }

    pub fn context_mut(&mut self) -> &mut Context {
        self.context.as_mut().expect("CothreadQueue::start was not called")
    }

    pub fn create_cothread(&mut self) -> Result<Cothread, Error> {
        let ct = self.context_mut().create()?;
        self.entries.insert(
            ct,
            Entry {
                state: CothreadState::Stopped,
                sleeping: false,
                deferred_mutex: None,
                cancel_requested: false,
            },
        );
        Ok(ct)
    }

    /// Enter one of the three cothread-queue states. Entering `Running`
    /// from `Stopped` pushes the cothread onto the run list (the caller
    /// is expected to have already bound its function via
    /// `context_mut().setfunc` beforehand). Entering `Stopped` from
    /// `Running` unlinks it from the run list if present.
    pub fn change_state(&mut self, ct: Cothread, new: CothreadState) {
        let old = self.entries.get(&ct).map(|e| e.state).unwrap_or(CothreadState::Stopped);
        if let Some(entry) = self.entries.get_mut(&ct) {
            entry.state = new;
        }
        match (old, new) {
            (CothreadState::Stopped, CothreadState::Running) => {
                self.activate(ct);
            }
            (CothreadState::Running, CothreadState::Stopped) => {
                self.deactivate(ct);
            }
            _ => {}
        }
    }

    fn activate(&mut self, ct: Cothread) {
        if !self.run_list.contains(&ct) {
            self.run_list.push_back(ct);
        }
    }

    fn deactivate(&mut self, ct: Cothread) {
        self.run_list.retain(|c| *c != ct);
    }

    /// From within `ct` (the current cothread): mark it sleeping, unlink
    /// it from the run list, optionally release `mutex` (for atomicity
    /// with whatever state change prompted the sleep), and switch back
    /// to the main cothread. `mutex`, if given, is relocked on `ct`'s
    /// behalf the next time `iterate()` switches into it.
    pub fn sleep(&mut self, ct: Cothread, mutex: Option<Arc<Mutex<()>>>) -> Result<(), Error> {
        self.deactivate(ct);
        if let Some(entry) = self.entries.get_mut(&ct) {
            entry.sleeping = true;
            entry.deferred_mutex = mutex;
        }
        let main = self.context().main();
        self.context_mut().switch(main)?;
        Ok(())
    }

    /// Like [`CothreadQueue::sleep`], but re-inserts `ct` at the tail of
    /// the run list before switching out, so it remains runnable at
    /// lower priority instead of requiring an explicit wake.
    pub fn yield_(&mut self, ct: Cothread, mutex: Option<Arc<Mutex<()>>>) -> Result<(), Error> {
        self.deactivate(ct);
        self.run_list.push_back(ct);
        if let Some(entry) = self.entries.get_mut(&ct) {
            entry.sleeping = false;
            entry.deferred_mutex = mutex;
        }
        let main = self.context().main();
        self.context_mut().switch(main)?;
        Ok(())
    }

    /// Clears the sleeping flag and, if `ct` is in the `Running` state,
    /// reinserts it into the run list: at the head if `priority > 0`,
    /// otherwise at the tail.
    pub fn awake(&mut self, ct: Cothread, priority: i32) {
        let running = matches!(self.entries.get(&ct).map(|e| e.state), Some(CothreadState::Running));
        if let Some(entry) = self.entries.get_mut(&ct) {
            entry.sleeping = false;
        }
        if running && !self.run_list.contains(&ct) {
            if priority > 0 {
                self.run_list.push_front(ct);
            } else {
                self.run_list.push_back(ct);
            }
        }
    }

    /// Arms `ct`'s cancellation flag and wakes it with the same priority
    /// `awake` gives a real event, so it is rescheduled promptly whether
    /// or not it is actually asleep right now. Every blocking primitive in
    /// `crate::link`/`crate::policy` checks [`CothreadQueue::take_cancelled`]
    /// both before registering as a waiter and after waking from sleep, so
    /// the flag is honoured regardless of which wait (or none at all) `ct`
    /// happens to be in when this is called.
    pub fn request_cancel(&mut self, ct: Cothread) {
        if let Some(entry) = self.entries.get_mut(&ct) {
            entry.cancel_requested = true;
        }
        self.awake(ct, 1);
    }

    /// Checks and clears `ct`'s cancellation flag. One-shot: a second call
    /// without an intervening `request_cancel` returns `false`.
    pub fn take_cancelled(&mut self, ct: Cothread) -> bool {
        match self.entries.get_mut(&ct) {
            Some(entry) if entry.cancel_requested => {
                entry.cancel_requested = false;
                true
            }
            _ => false,
        }
    }

    /// A handle foreign OS threads can clone to post async operations
    /// without touching the rest of the queue.
    pub fn async_handle(&self) -> AsyncHandle {
        AsyncHandle {
            ops: self.async_ops.clone(),
        }
    }

    fn drain_async_ops(&mut self) {
        let mut pending = Vec::new();
        {
            let (lock, _cvar) = &*self.async_ops;
            let mut queue = lock.lock().expect("async op queue poisoned");
            pending.extend(queue.drain(..));
        }
        for op in pending {
            match op {
                AsyncOp::ChangeState(ct, new) => self.change_state(ct, new),
                AsyncOp::Awake(ct, priority) => self.awake(ct, priority),
            }
        }
    }

    /// Dequeues the head cothread (if any) and switches into it. Returns
    /// `true` if a cothread ran; `false` if the queue waited (up to
    /// [`ASYNC_WAIT_TIMEOUT`]) on the async condvar with nothing to do.
    pub fn iterate(&mut self) -> Result<bool, Error> {
        self.drain_async_ops();

        if let Some(ct) = self.run_list.pop_front() {
            let deferred = self.entries.get_mut(&ct).and_then(|e| e.deferred_mutex.take());
            let _guard = deferred.as_ref().map(|m| m.lock().expect("link mutex poisoned"));
            let ctx = self.context.as_mut().expect("CothreadQueue::start was not called");
            // Thread-local context is scoped to this call, per the
            // Design Notes: installed on entry, cleared on exit, rather
            // than living in a process-wide key.
            ctx.activate();
            let result = ctx.switch(ct);
            ctx.deactivate();
            result?;
            return Ok(true);
        }

        let (lock, cvar) = &*self.async_ops;
        let guard = lock.lock().expect("async op queue poisoned");
        let _ = cvar.wait_timeout(guard, ASYNC_WAIT_TIMEOUT);
        Ok(false)
    }
}

/// A cloneable, `Send`-able handle for posting async operations from a
/// foreign OS thread. This is the only path by which a thread other than
/// the one driving `iterate()` may touch the queue.
#[derive(Clone)]
pub struct AsyncHandle {
    ops: Arc<(Mutex<VecDeque<AsyncOp>>, Condvar)>,
}

impl AsyncHandle {
    pub fn change_state_async(&self, ct: Cothread, new: CothreadState) {
        let (lock, cvar) = &*self.ops;
        lock.lock()
            .expect("async op queue poisoned")
            .push_back(AsyncOp::ChangeState(ct, new));
        cvar.notify_one();
    }

    pub fn awake_async(&self, ct: Cothread, priority: i32) {
        let (lock, cvar) = &*self.ops;
        lock.lock()
            .expect("async op queue poisoned")
            .push_back(AsyncOp::Awake(ct, priority));
        cvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    #[test]
    fn change_state_running_makes_cothread_iterable() {
        let mut queue = CothreadQueue::create(ContextConfig::default());
        queue.start();
        let ct = queue.create_cothread().unwrap();
        let ran = StdArc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        queue.context_mut().setfunc(ct, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }).unwrap();
        queue.change_state(ct, CothreadState::Running);

        assert!(queue.iterate().unwrap());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn iterate_with_nothing_runnable_times_out_without_panicking() {
        let mut queue = CothreadQueue::create(ContextConfig::default());
        queue.start();
        assert!(!queue.iterate().unwrap());
    }

    #[test]
    fn async_awake_reaches_run_list_on_next_iterate() {
        let mut queue = CothreadQueue::create(ContextConfig::default());
        queue.start();
        let ct = queue.create_cothread().unwrap();
        queue.context_mut().setfunc(ct, || {}).unwrap();
        queue.change_state(ct, CothreadState::Running);
        // Simulate the cothread having gone to sleep already.
        queue.sleep(ct, None).unwrap();

        let handle = queue.async_handle();
        handle.awake_async(ct, 1);

        assert!(queue.iterate().unwrap());
    }
}
