//! Element cothread bodies (C5): the three distinct shapes a Playing
//! element's cothread runs under.
//!
//! Grounded in `examples/original_source/gst/schedulers/entryscheduler.c`'s
//! `gst_entry_scheduler_{loop,chain,get}_wrapper` and their `setup_*`
//! counterparts. The source registers a `CothreadPrivate` subtype per
//! shape plus a matching `can_schedule` function pointer; here that
//! collapses to one [`WrapperKind`] tag (`classify`) plus one body
//! function per tag, since `can_schedule` itself reduces to whichever
//! link primitive ([`crate::link::LinkTable::pull`],
//! [`crate::policy::Scheduler::pad_select`]) the body blocks on.

use crate::policy;
use crate::traits::{Direction, GraphHost, WrapperKind};

/// Picks the cothread-body shape for `element` from whatever functions
/// the host reports for it and its pads: a loopfunc takes priority (it
/// drives its own pads internally), then a chain-capable sink pad, then
/// a get-capable source pad.
pub fn classify<H: GraphHost>(host: &H, element: H::Element) -> Option<WrapperKind> {
    if host.element_loopfunc(element).is_some() {
        return Some(WrapperKind::Loop);
    }

    let pads = host.element_pads(element);
    let has_chain_sink = pads
        .iter()
        .any(|&pad| host.pad_direction(pad) == Direction::Sink && host.pad_chainfunc(pad).is_some());
    if has_chain_sink {
        return Some(WrapperKind::Chain);
    }

    let has_get_src = pads
        .iter()
        .any(|&pad| host.pad_direction(pad) == Direction::Src && host.pad_getfunc(pad).is_some());
    if has_get_src {
        return Some(WrapperKind::Get);
    }

    None
}

/// Builds the cothread body bound via `cothread::Context::setfunc` for
/// `kind`. The closure captures nothing but `element` (`Copy`) and
/// reaches the scheduler driving it through [`policy::with_current`],
/// the same thread-local-pointer idiom `cothread::context::Context` uses
/// for its own per-OS-thread current context.
pub fn body<H: GraphHost>(kind: WrapperKind, element: H::Element) -> impl FnMut() + 'static {
    move || match kind {
        WrapperKind::Loop => loop_body::<H>(element),
        WrapperKind::Chain => chain_body::<H>(element),
        WrapperKind::Get => get_body::<H>(element),
    }
}

/// Mirrors `gst_entry_scheduler_loop_wrapper`'s `do { loopfunc(); ...}
/// while (TRUE)`. Each cycle ends with a voluntary yield so the turn
/// passes to whatever else is runnable, the round-robin fairness
/// `schedule_next_element` gave the source for free by returning to the
/// scheduler's own selection loop.
fn loop_body<H: GraphHost>(element: H::Element) {
    loop {
        let keep_going = policy::with_current::<H, _>(|inner| inner.run_loopfunc(element));
        if !keep_going {
            policy::with_current::<H, _>(|inner| inner.retire_current());
            return;
        }
        policy::with_current::<H, _>(|inner| inner.yield_current());
    }
}

/// Mirrors `gst_entry_scheduler_chain_wrapper`: each turn waits for one
/// of the element's sink pads to have data (via `pad_select`, which
/// folds in `get_buffer`'s DISCONT synthesis), dispatches it to the
/// matching chain or event function, then yields.
fn chain_body<H: GraphHost>(element: H::Element) {
    loop {
        let keep_going = policy::with_current::<H, _>(|inner| inner.run_chain_turn(element));
        if !keep_going {
            policy::with_current::<H, _>(|inner| inner.retire_current());
            return;
        }
        policy::with_current::<H, _>(|inner| inner.yield_current());
    }
}

/// Mirrors `gst_entry_scheduler_get_wrapper`: each turn calls the
/// element's getfunc and pushes the result into its (single) source
/// link, blocking there if downstream hasn't drained the previous one.
/// Once the getfunc reports end-of-stream (`None`), the turn reports
/// `false` and this body retires its own cothread instead of yielding and
/// being rescheduled — getfunc is never called again for this element.
fn get_body<H: GraphHost>(element: H::Element) {
    loop {
        let keep_going = policy::with_current::<H, _>(|inner| inner.run_get_turn(element));
        if !keep_going {
            policy::with_current::<H, _>(|inner| inner.retire_current());
            return;
        }
        policy::with_current::<H, _>(|inner| inner.yield_current());
    }
}
