//! A dataflow element/pad graph execution scheduler: a cooperative
//! cothread runtime specialised to the loop/chain/get element shapes of
//! a streaming media pipeline, plus the link-level flow control and
//! clock synchronisation that connect them.
//!
//! Built on top of the `cothread` crate (stackful coroutines and a run
//! queue with no notion of elements or pads); this crate adds the
//! element/pad graph on top: [`link`] is the per-link single-slot
//! mailbox (C4), [`element`] is the three cothread-body shapes a
//! Playing element runs under (C5), [`policy`] is the scheduling policy
//! that ties them together (C6, fair variant), and [`iterate`] is the
//! one-tick driver a host calls in its own main loop (C7). [`traits`]
//! is the `GraphHost` collaborator interface a host implements once over
//! its own element/pad/data types (spec §6); [`error`] is this crate's
//! error taxonomy (spec §7).

mod element;
pub mod error;
mod iterate;
mod link;
mod policy;
mod queue;
pub mod traits;

pub use cothread::{ContextConfig, Cothread};
pub use error::Error;
pub use iterate::Status;
pub use link::{LinkId, PullOutcome, PushOutcome};
pub use policy::{ClockWaitResult, PadSelectResult, Scheduler};
pub use queue::AsyncHandle;
pub use traits::{
    BufferTiming, ChainFn, Direction, ElementFlags, ElementState, EventFn, GetFn, GraphHost, LoopFn,
    StateTransition, WrapperKind,
};

/// Called from inside a host's own loopfunc implementation to push data
/// out of one of the owning element's source pads.
pub fn pad_push<H: GraphHost>(pad: H::Pad, data: H::Data) -> Result<PushOutcome<H::Data>, Error> {
    policy::pad_push::<H>(pad, data)
}

/// Called from inside a host's own loopfunc implementation to pull data
/// in through one of the owning element's sink pads.
pub fn pad_pull<H: GraphHost>(pad: H::Pad) -> Result<PullOutcome<H::Data>, Error> {
    policy::pad_pull::<H>(pad)
}

/// Called from inside a host's own loopfunc implementation to wait for
/// data on whichever of several sink pads becomes ready first.
pub fn pad_select<H: GraphHost>(pads: &[H::Pad]) -> Result<PadSelectResult<H>, Error> {
    policy::pad_select::<H>(pads)
}

/// Called from inside a host's own loopfunc implementation to block
/// until the scheduler's clock reaches `deadline`.
pub fn clock_wait<H: GraphHost>(deadline: u64) -> Result<ClockWaitResult, Error> {
    policy::clock_wait::<H>(deadline)
}

/// Called from inside a host's own loopfunc implementation to voluntarily
/// hand its turn to whatever else is runnable (spec §6 `scheduler_yield`).
pub fn scheduler_yield<H: GraphHost>(element: H::Element) -> bool {
    policy::scheduler_yield::<H>(element)
}
