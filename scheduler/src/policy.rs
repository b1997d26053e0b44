//! Scheduling policy (C6), fair-scheduler variant: element lifecycle,
//! link wiring, the `pad_select`/`clock_wait` primitives an element's
//! own loop/chain/get body calls back into, and the diagnostic `show`
//! dump.
//!
//! `schedule_now`/`schedule_possible` (spec §4.6) do not appear here as
//! a distinct pair of lists: they collapse onto
//! [`crate::queue::CothreadQueue`]'s run list, which already gives
//! "run this one right away" (`awake(ct, 1)`, pushed to the front) and
//! "run this one in its turn" (`awake(ct, 0)`, pushed to the back) for
//! free. The `waiting` list is new here and is not optional: it is the
//! one piece of `entryscheduler.c` explicitly punts on
//! (`gst_entry_scheduler_clock_wait` has no sorted wait list), so it is
//! grounded instead in `fairscheduler.c`'s
//! `gst_fair_scheduler_clock_wait` / `gst_fair_scheduler_iterate`.

use std::cell::Cell;
use std::collections::HashMap;
use std::ptr;

use cothread::{ContextConfig, Cothread};

use crate::element;
use crate::error::Error;
use crate::link::{LinkId, LinkTable, PullOutcome, PushOutcome};
use crate::queue::{CothreadQueue, CothreadState};
use crate::traits::{Direction, ElementFlags, GraphHost, StateTransition, WrapperKind};

thread_local! {
    static CURRENT: Cell<*mut ()> = const { Cell::new(std::ptr::null_mut()) };
}

/// What an element's single pending pad-select wait resolves to: either
/// one of the candidate pads had data, or the wait was cancelled out
/// from under it by [`Scheduler::interrupt`].
#[derive(Debug)]
pub enum PadSelectResult<H: GraphHost> {
    Data(H::Pad, H::Data),
    Interrupted,
}

/// Outcome of `scheduler_clock_wait` (spec §6): either the requested time
/// had already passed (`Early`) or the cothread actually slept until the
/// clock caught up (`Woken`). Both carry the jitter between requested and
/// observed time, per `gst_fair_scheduler_clock_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockWaitResult {
    Early { jitter: u64 },
    Woken { jitter: u64 },
    Interrupted,
}

struct WaitEntry {
    deadline: u64,
    cothread: Cothread,
}

struct ElementEntry {
    cothread: Option<Cothread>,
    kind: Option<WrapperKind>,
}

impl ElementEntry {
    fn new() -> ElementEntry {
        ElementEntry {
            cothread: None,
            kind: None,
        }
    }
}

/// Everything the running element cothreads and the driving OS thread
/// both need mutable access to. Lives behind a stable `Box` inside
/// [`Scheduler`] so the raw pointer installed in `CURRENT` while an
/// element's body runs stays valid.
pub struct SchedulerInner<H: GraphHost> {
    host: H,
    links: LinkTable<H>,
    queue: CothreadQueue,
    elements: HashMap<H::Element, ElementEntry>,
    waiting: Vec<WaitEntry>,
    playing_count: usize,
    error: Option<Error>,
}

impl<H: GraphHost> SchedulerInner<H> {
    fn element_of(&self, pad: H::Pad) -> H::Element {
        self.host.pad_parent(pad)
    }

    fn report_error(&mut self, element: H::Element, detail: impl Into<String>) {
        let detail = detail.into();
        log::error!("element {} misbehaved: {}", self.host.element_name(element), detail);
        self.error = Some(Error::ElementMisbehavior {
            element: self.host.element_name(element),
            detail,
        });
    }

    fn current(&self) -> Cothread {
        self.queue.context().current()
    }

    fn elements_cothread(&self, element: H::Element) -> Option<Cothread> {
        self.elements.get(&element).and_then(|e| e.cothread)
    }

    /// Sets `need_discont` on every link touching `element`'s pads. Spec
    /// §3: this happens both the first time an element leaves `READY` for
    /// `PAUSED`, and every later `PLAYING -> PAUSED` pause, so that
    /// resuming playback always re-synchronises downstream Sinks with a
    /// fresh discontinuity.
    fn mark_links_need_discont(&mut self, element: H::Element) {
        for pad in self.host.element_pads(element) {
            let link = self.links.find_by_src(pad).or_else(|| self.links.find_by_sink(pad));
            if let Some(link) = link {
                self.links.mark_need_discont(link);
            }
        }
    }

    /// Used by a loop-based element's own loopfunc to push a buffer or
    /// event out of one of its source pads.
    pub fn pad_push(&mut self, pad: H::Pad, data: H::Data) -> Result<PushOutcome<H::Data>, Error> {
        let link = self.links.find_by_src(pad).ok_or_else(|| Error::ElementMisbehavior {
            element: self.host.element_name(self.element_of(pad)),
            detail: format!("pad_push on unlinked pad {}", self.host.pad_name(pad)),
        })?;
        let current = self.current();
        self.links.push(link, &mut self.queue, current, data)
    }

    /// Used by a loop-based element's own loopfunc to pull a buffer from
    /// one of its sink pads.
    pub fn pad_pull(&mut self, pad: H::Pad) -> Result<PullOutcome<H::Data>, Error> {
        let link = self.links.find_by_sink(pad).ok_or_else(|| Error::ElementMisbehavior {
            element: self.host.element_name(self.element_of(pad)),
            detail: format!("pad_pull on unlinked pad {}", self.host.pad_name(pad)),
        })?;
        let current = self.current();
        self.links.pull(link, &mut self.queue, current)
    }

    /// Scans `pads` (expected to all be sink pads of the same element) for
    /// one that already has data ready, without blocking.
    fn scan_pads_ready(&mut self, pads: &[H::Pad]) -> Option<(H::Pad, H::Data)> {
        for &pad in pads {
            if let Some(link) = self.links.find_by_sink(pad) {
                if let Some(data) = self.links.get_buffer(link, &mut self.queue, &self.host) {
                    return Some((pad, data));
                }
            }
        }
        None
    }

    /// Blocks the current cothread until one of `pads` has data ready, or
    /// until [`Scheduler::interrupt`] cancels the wait. A cancellation is
    /// only honoured once a full pass over `pads` finds nothing ready —
    /// real data that raced the cancellation always wins, so a buffer that
    /// actually arrived is never abandoned in favour of a stale-seeming
    /// interrupt.
    pub fn pad_select(&mut self, pads: &[H::Pad]) -> Result<PadSelectResult<H>, Error> {
        let current = self.current();
        loop {
            if let Some((pad, data)) = self.scan_pads_ready(pads) {
                return Ok(PadSelectResult::Data(pad, data));
            }

            if self.queue.take_cancelled(current) {
                return Ok(PadSelectResult::Interrupted);
            }

            for &pad in pads {
                if let Some(link) = self.links.find_by_sink(pad) {
                    self.links.set_waiting_reader(link, current);
                }
            }
            self.queue.sleep(current, None)?;
            let cancelled = self.queue.take_cancelled(current);
            for &pad in pads {
                if let Some(link) = self.links.find_by_sink(pad) {
                    self.links.clear_waiting_reader(link, current);
                }
            }

            if cancelled {
                if let Some((pad, data)) = self.scan_pads_ready(pads) {
                    return Ok(PadSelectResult::Data(pad, data));
                }
                return Ok(PadSelectResult::Interrupted);
            }
        }
    }

    /// Re-enqueues the current cothread at the tail of the run list and
    /// switches back to the scheduler, the way every wrapper body hands
    /// its turn back after processing one buffer.
    pub fn yield_current(&mut self) {
        let current = self.current();
        // A switch failure here means the cothread runtime itself is in
        // a state this crate cannot recover from; record it and let the
        // next `Scheduler::iterate` report it.
        if let Err(e) = self.queue.yield_(current, None) {
            self.error = Some(e);
        }
    }

    /// Marks the current cothread `Stopped` in the queue's own bookkeeping
    /// without switching away from it. Called by a wrapper body right
    /// before it returns for good (end-of-stream, a cancelled wait it
    /// chooses not to retry, or a misbehaving-element error), so a later
    /// stray `awake` can never reinsert a cothread whose body function has
    /// already ended into the run list.
    pub(crate) fn retire_current(&mut self) {
        let current = self.current();
        self.queue.change_state(current, CothreadState::Stopped);
    }

    /// Blocks the current cothread until `deadline` (in the host clock's
    /// units) has passed, returning the jitter between the requested and
    /// actual wake time. Grounded in
    /// `gst_fair_scheduler_clock_wait`: an already-past deadline returns
    /// immediately instead of sleeping.
    pub fn clock_wait(&mut self, deadline: u64) -> Result<ClockWaitResult, Error> {
        let now = self.host.clock_get_time()?;
        if deadline <= now {
            return Ok(ClockWaitResult::Early { jitter: now - deadline });
        }

        let current = self.current();
        if self.queue.take_cancelled(current) {
            return Ok(ClockWaitResult::Interrupted);
        }

        let pos = self.waiting.partition_point(|w| w.deadline <= deadline);
        self.waiting.insert(pos, WaitEntry { deadline, cothread: current });
        self.queue.sleep(current, None)?;

        // `drain_waiting` removes the entry itself once the deadline
        // actually passes; if it is still here, nothing but a
        // cancellation could have woken this cothread.
        let cancelled = self.queue.take_cancelled(current);
        let still_waiting = self.waiting.iter().any(|w| w.cothread == current);
        if cancelled && still_waiting {
            self.waiting.retain(|w| w.cothread != current);
            return Ok(ClockWaitResult::Interrupted);
        }

        let woke_at = self.host.clock_get_time()?;
        Ok(ClockWaitResult::Woken { jitter: woke_at.saturating_sub(deadline) })
    }

    /// Called by an element from inside its own loop/chain/get body to
    /// voluntarily hand its turn to whatever else is runnable. Distinct
    /// from [`SchedulerInner::pad_select`]'s blocking wait: this always
    /// returns promptly once the cothread is rescheduled. Per the Open
    /// Question in `DESIGN.md`, kept semantically distinct from
    /// `interrupt`, which is host-driven cancellation rather than
    /// self-directed rescheduling.
    pub fn scheduler_yield(&mut self, element: H::Element) -> bool {
        let Some(ct) = self.elements_cothread(element) else {
            return false;
        };
        if ct != self.current() {
            log::warn!(
                "scheduler_yield({}) called from a cothread that is not its own",
                self.host.element_name(element)
            );
            return false;
        }
        self.yield_current();
        true
    }

    fn drain_waiting(&mut self) {
        let now = match self.host.clock_get_time() {
            Ok(now) => now,
            Err(_) => return,
        };
        while let Some(front) = self.waiting.first() {
            if front.deadline > now {
                break;
            }
            let entry = self.waiting.remove(0);
            self.queue.awake(entry.cothread, 1);
        }
    }

    pub(crate) fn run_loopfunc(&mut self, element: H::Element) -> bool {
        match self.host.element_loopfunc(element) {
            Some(f) => {
                log::trace!("calling loopfunc for {}", self.host.element_name(element));
                f(&self.host, element);
                true
            }
            None => {
                self.report_error(element, "loop-based element removed loopfunc during processing");
                false
            }
        }
    }

    pub(crate) fn run_chain_turn(&mut self, element: H::Element) -> bool {
        let sinks: Vec<H::Pad> = self
            .host
            .element_pads(element)
            .into_iter()
            .filter(|&pad| self.host.pad_direction(pad) == Direction::Sink)
            .collect();
        if sinks.is_empty() {
            return false;
        }

        match self.pad_select(&sinks) {
            Ok(PadSelectResult::Data(pad, data)) => self.dispatch_chain(element, pad, data),
            Ok(PadSelectResult::Interrupted) => false,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    fn dispatch_chain(&mut self, element: H::Element, pad: H::Pad, data: H::Data) -> bool {
        let event_aware = self.host.element_flags(element).contains(ElementFlags::EVENT_AWARE);
        if self.host.data_is_event(&data) && !event_aware {
            return match self.host.pad_eventfunc(pad) {
                Some(eventfunc) => match eventfunc(&self.host, element, pad, data) {
                    Ok(()) => true,
                    Err(e) => {
                        self.error = Some(e);
                        false
                    }
                },
                None => {
                    self.host.data_unref(data);
                    true
                }
            };
        }

        log::trace!("calling chainfunc for pad {}", self.host.pad_name(pad));
        match self.host.pad_chainfunc(pad) {
            Some(chainfunc) => match chainfunc(&self.host, element, pad, data) {
                Ok(()) => true,
                Err(e) => {
                    self.error = Some(e);
                    false
                }
            },
            None => {
                self.report_error(element, "chain-based element removed chainfunc of pad during processing");
                self.host.data_unref(data);
                false
            }
        }
    }

    pub(crate) fn run_get_turn(&mut self, element: H::Element) -> bool {
        let src = self
            .host
            .element_pads(element)
            .into_iter()
            .find(|&pad| self.host.pad_direction(pad) == Direction::Src && self.host.pad_getfunc(pad).is_some());
        let Some(pad) = src else {
            return false;
        };
        let Some(getfunc) = self.host.pad_getfunc(pad) else {
            self.report_error(element, "get-based element removed getfunc during processing");
            return false;
        };

        log::trace!("calling getfunc for pad {}", self.host.pad_name(pad));
        let Some(data) = getfunc(&self.host, element, pad) else {
            log::debug!(
                "{}: getfunc reached end-of-stream; retiring its cothread",
                self.host.element_name(element)
            );
            return false;
        };

        if !self.host.element_pads(element).contains(&pad) {
            self.report_error(element, "get-based element removed pad during getfunc");
            self.host.data_unref(data);
            return false;
        }
        let Some(link) = self.links.find_by_src(pad) else {
            self.report_error(element, "get-based element unlinked pad during getfunc");
            self.host.data_unref(data);
            return false;
        };

        let current = self.current();
        match self.links.push(link, &mut self.queue, current, data) {
            Ok(PushOutcome::Delivered) => true,
            Ok(PushOutcome::Interrupted(data)) => {
                log::debug!(
                    "{}: push interrupted by scheduler_interrupt; retiring its cothread",
                    self.host.element_name(element)
                );
                self.host.data_unref(data);
                false
            }
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }
}

/// Calls `f` with the [`SchedulerInner`] currently driving the OS thread
/// it runs on. Any [`crate::element`] body, and only such a body, may
/// call this — it is how element loopfuncs reach `pad_push`/`pad_pull`
/// without the scheduler threading a handle through every host call.
pub fn with_current<H: GraphHost, R>(f: impl FnOnce(&mut SchedulerInner<H>) -> R) -> R {
    CURRENT.with(|c| {
        let ptr = c.get();
        assert!(
            !ptr.is_null(),
            "element cothread body ran without an active Scheduler on this OS thread"
        );
        // SAFETY: installed by `Scheduler::activate` before the owning
        // context can switch into any element cothread, and cleared by
        // `Scheduler::deactivate` before `iterate` returns; element
        // bodies only ever run on the OS thread driving their scheduler.
        f(unsafe { &mut *(ptr as *mut SchedulerInner<H>) })
    })
}

/// `pad_push`/`pad_pull`/`pad_select` for use from inside a host's own
/// loopfunc, chainfunc, getfunc, or eventfunc implementation, which only
/// ever receive `&H` and the element/pad handles, never a scheduler
/// reference.
pub fn pad_push<H: GraphHost>(pad: H::Pad, data: H::Data) -> Result<PushOutcome<H::Data>, Error> {
    with_current::<H, _>(|inner| inner.pad_push(pad, data))
}

pub fn pad_pull<H: GraphHost>(pad: H::Pad) -> Result<PullOutcome<H::Data>, Error> {
    with_current::<H, _>(|inner| inner.pad_pull(pad))
}

pub fn pad_select<H: GraphHost>(pads: &[H::Pad]) -> Result<PadSelectResult<H>, Error> {
    with_current::<H, _>(|inner| inner.pad_select(pads))
}

pub fn clock_wait<H: GraphHost>(deadline: u64) -> Result<ClockWaitResult, Error> {
    with_current::<H, _>(|inner| inner.clock_wait(deadline))
}

/// `scheduler_yield(element)` (spec §6) for use from inside a host's own
/// loop/chain/get function, mirroring how `pad_push`/`pad_pull` reach the
/// driving scheduler without it threading a handle through every host
/// call.
pub fn scheduler_yield<H: GraphHost>(element: H::Element) -> bool {
    with_current::<H, _>(|inner| inner.scheduler_yield(element))
}

/// The element/pad/link graph scheduler. Owns the cothread runtime and
/// the link table; the host drives it via [`Scheduler::iterate`] and the
/// element/pad lifecycle methods below.
pub struct Scheduler<H: GraphHost> {
    inner: Box<SchedulerInner<H>>,
}

impl<H: GraphHost> Scheduler<H> {
    pub fn new(host: H, config: ContextConfig) -> Scheduler<H> {
        let mut queue = CothreadQueue::create(config);
        queue.start();
        Scheduler {
            inner: Box::new(SchedulerInner {
                host,
                links: LinkTable::new(),
                queue,
                elements: HashMap::new(),
                waiting: Vec::new(),
                playing_count: 0,
                error: None,
            }),
        }
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    /// The cothread backing `element`'s loop/chain/get body, if it has
    /// one running yet (set up on its first `PAUSED` transition).
    pub fn element_cothread(&self, element: H::Element) -> Option<Cothread> {
        self.inner.elements_cothread(element)
    }

    /// A cloneable handle a foreign OS thread can use to post async
    /// state-change/awake requests into this scheduler's run queue
    /// (spec §8 scenario 5), independent of whatever thread is currently
    /// blocked inside [`Scheduler::iterate`].
    pub fn async_handle(&self) -> crate::queue::AsyncHandle {
        self.inner.queue.async_handle()
    }

    fn activate(&mut self) {
        let ptr = &mut *self.inner as *mut SchedulerInner<H> as *mut ();
        CURRENT.with(|c| c.set(ptr));
    }

    fn deactivate(&mut self) {
        let ptr = &mut *self.inner as *mut SchedulerInner<H> as *mut ();
        CURRENT.with(|c| {
            if c.get() == ptr {
                c.set(ptr::null_mut());
            }
        });
    }

    pub fn add_element(&mut self, element: H::Element) {
        self.inner.elements.entry(element).or_insert_with(ElementEntry::new);
    }

    pub fn remove_element(&mut self, element: H::Element) -> Result<(), Error> {
        if let Some(entry) = self.inner.elements.remove(&element) {
            if let Some(ct) = entry.cothread {
                self.inner.queue.change_state(ct, CothreadState::Stopped);
                self.inner.queue.context_mut().destroy(ct)?;
            }
        }
        Ok(())
    }

    pub fn pad_link(&mut self, src: H::Pad, sink: H::Pad) -> LinkId {
        self.inner.links.insert(src, sink)
    }

    /// Tears down the link between `src` and `sink`, discarding any
    /// pending data (I4), and destroys either endpoint's cothread if that
    /// element is decoupled and is left with no remaining links — the
    /// orphan-cleanup resolution of the `pad_disconnect` Open Question.
    pub fn pad_unlink(&mut self, src: H::Pad, sink: H::Pad) -> Result<(), Error> {
        let Some(link) = self.inner.links.find_by_src(src) else {
            return Ok(());
        };
        self.inner.links.remove(link, &self.inner.host);

        for pad in [src, sink] {
            let element = self.inner.host.pad_parent(pad);
            let decoupled = self.inner.host.element_flags(element).contains(ElementFlags::DECOUPLED);
            if !decoupled {
                continue;
            }
            let still_linked = self
                .inner
                .host
                .element_pads(element)
                .into_iter()
                .any(|p| self.inner.links.find_by_src(p).is_some() || self.inner.links.find_by_sink(p).is_some());
            if !still_linked {
                if let Some(entry) = self.inner.elements.get_mut(&element) {
                    if let Some(ct) = entry.cothread.take() {
                        log::warn!("destroying orphaned cothread for decoupled element {}", self.inner.host.element_name(element));
                        self.inner.queue.change_state(ct, CothreadState::Stopped);
                        self.inner.queue.context_mut().destroy(ct)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Forwards `element` through `transition`, creating, starting,
    /// stopping, or destroying its cothread as needed. Grounded in
    /// `entryscheduler.c`'s `gst_entry_scheduler_state_transition` /
    /// `_setup_cothread`.
    pub fn state_transition(&mut self, element: H::Element, transition: StateTransition) -> Result<(), Error> {
        match transition {
            StateTransition::NullToReady => {
                self.inner.elements.entry(element).or_insert_with(ElementEntry::new);
            }
            StateTransition::ReadyToPaused => {
                self.inner.mark_links_need_discont(element);

                let kind = element::classify(&self.inner.host, element);
                if let Some(kind) = kind {
                    let already_has_cothread = self
                        .inner
                        .elements
                        .get(&element)
                        .and_then(|e| e.cothread)
                        .is_some();
                    if !already_has_cothread {
                        let ct = self.inner.queue.create_cothread()?;
                        let closure = element::body::<H>(kind, element);
                        self.inner.queue.context_mut().setfunc(ct, closure)?;
                        self.inner
                            .queue
                            .context_mut()
                            .set_name(ct, self.inner.host.element_name(element))?;
                        let entry = self.inner.elements.entry(element).or_insert_with(ElementEntry::new);
                        entry.cothread = Some(ct);
                        entry.kind = Some(kind);
                    }
                }
            }
            StateTransition::PausedToPlaying => {
                if let Some(ct) = self.inner.elements.get(&element).and_then(|e| e.cothread) {
                    self.inner.queue.change_state(ct, CothreadState::Running);
                }
                self.inner.playing_count += 1;
            }
            StateTransition::PlayingToPaused => {
                if let Some(ct) = self.inner.elements.get(&element).and_then(|e| e.cothread) {
                    self.inner.queue.change_state(ct, CothreadState::Stopped);
                }
                self.inner.playing_count = self.inner.playing_count.saturating_sub(1);
                self.inner.mark_links_need_discont(element);
            }
            StateTransition::PausedToReady => {
                if let Some(entry) = self.inner.elements.get_mut(&element) {
                    if let Some(ct) = entry.cothread.take() {
                        self.inner.queue.change_state(ct, CothreadState::Stopped);
                        self.inner.queue.context_mut().destroy(ct)?;
                    }
                    entry.kind = None;
                }
            }
            StateTransition::ReadyToNull => {}
        }
        Ok(())
    }

    /// `scheduler_interrupt(element)` (spec §6): cancels whatever blocking
    /// wait `element`'s cothread is currently in — `pad_select`,
    /// `pad_push`/`pad_pull`, or `clock_wait` — waking it with a
    /// cancellation indication (`Interrupted`) per spec §5 instead of the
    /// result that primitive would otherwise produce. If the cothread is
    /// not currently blocked at all (it is mid-turn, merely queued for its
    /// next turn, or `Stopped`), the cancellation is armed and takes effect
    /// the next time it enters one of these primitives, rather than being
    /// silently dropped or leaking into some later, unrelated wait.
    /// Distinct from `yield`, which a cothread uses on itself to
    /// cooperatively hand back its turn (spec §4.6 Open Question). Returns
    /// `true` if `element` had a cothread to interrupt.
    pub fn interrupt(&mut self, element: H::Element) -> bool {
        let Some(ct) = self.inner.elements.get(&element).and_then(|e| e.cothread) else {
            return false;
        };
        self.inner.queue.request_cancel(ct);
        true
    }

    /// `scheduler_error(element)` (spec §6): the host calls this when it
    /// observes an "element error" posted on its own bus/messaging layer
    /// (out of scope here), per §4.6's second failure bullet. Sets the
    /// graph's error flag so the next `iterate()` returns
    /// [`crate::iterate::Status::Error`].
    pub fn error(&mut self, element: H::Element) {
        self.inner.report_error(element, "error posted by host");
    }

    /// `scheduler_reset` (spec §6): clears the graph error flag and tears
    /// down every element cothread, link, and pending wait so the
    /// scheduler can be reused for a fresh graph without reallocating a
    /// new `Scheduler`. Elements and links themselves are host-owned and
    /// must be re-added/re-linked by the caller afterwards.
    pub fn reset(&mut self) {
        self.inner.queue.stop();
        self.inner.queue.start();
        self.inner.elements.clear();
        self.inner.links = LinkTable::new();
        self.inner.waiting.clear();
        self.inner.playing_count = 0;
        self.inner.error = None;
    }

    /// A human-readable dump of every element's scheduling state, for
    /// diagnostics. Also logged at info level (spec §6 supplement).
    pub fn show(&self) -> String {
        let mut out = String::new();
        for (element, entry) in &self.inner.elements {
            let locked = entry.cothread.map(|ct| self.inner.queue.context().is_locked(ct));
            out.push_str(&format!(
                "element {} state={:?} kind={:?} cothread={:?} locked={:?}\n",
                self.inner.host.element_name(*element),
                self.inner.host.element_state(*element),
                entry.kind,
                entry.cothread,
                locked,
            ));
        }
        out.push_str(&format!("waiting: {} cothread(s)\n", self.inner.waiting.len()));
        log::info!("{}", out);
        out
    }

    pub(crate) fn drain_waiting(&mut self) {
        self.inner.drain_waiting();
    }

    pub(crate) fn take_error(&mut self) -> Option<Error> {
        self.inner.error.take()
    }

    pub(crate) fn record_error(&mut self, error: Error) {
        self.inner.error = Some(error);
    }

    pub(crate) fn has_error(&self) -> bool {
        self.inner.error.is_some()
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.inner.playing_count > 0
    }

    pub(crate) fn run_queue_tick(&mut self) -> Result<bool, Error> {
        self.activate();
        let result = self.inner.queue.iterate();
        self.deactivate();
        result
    }
}
