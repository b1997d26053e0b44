//! External interfaces (spec §6): the surfaces this core consumes from
//! its element/pad data model collaborator. The host implements
//! [`GraphHost`] over whatever types it already uses for elements, pads,
//! and data units; this crate never owns that data, only opaque
//! `Copy + Eq + Hash` handles to it.
//!
//! `element_sched_private_slot` / `pad_sched_private_slot` from spec §6
//! are *not* part of this trait: per the Design Notes' arena-of-indices
//! recommendation, that bookkeeping is realized as the scheduler's own
//! internal tables (`crate::policy::Scheduler`'s per-element cothread
//! map and `crate::link`'s link arena) rather than round-tripped through
//! the host.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Null,
    Ready,
    Paused,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    NullToReady,
    ReadyToPaused,
    PausedToPlaying,
    PlayingToPaused,
    PausedToReady,
    ReadyToNull,
}

bitflags::bitflags! {
    /// Element flags (spec §6: `element_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ElementFlags: u32 {
        /// The element tolerates being scheduled as an island — typical
        /// of queues and bridges between subgraphs.
        const DECOUPLED = 1 << 0;
        /// The element's chain wrapper should hand events to the
        /// element's own event function instead of silently forwarding.
        const EVENT_AWARE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Src,
    Sink,
}

/// Which of the three cothread-body shapes (spec §4.5) an element runs
/// under. Computed by [`crate::element::classify`] from whichever
/// functions the host reports, rather than carried as its own host-facing
/// trait method — the source's variadic function-pointer registration
/// collapses to this one tagged enum per the Design Notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    Loop,
    Chain,
    Get,
}

pub type LoopFn<H> = fn(&H, <H as GraphHost>::Element);
pub type ChainFn<H> =
    fn(&H, <H as GraphHost>::Element, <H as GraphHost>::Pad, <H as GraphHost>::Data) -> Result<(), Error>;
pub type GetFn<H> =
    fn(&H, <H as GraphHost>::Element, <H as GraphHost>::Pad) -> Option<<H as GraphHost>::Data>;
pub type EventFn<H> =
    fn(&H, <H as GraphHost>::Element, <H as GraphHost>::Pad, <H as GraphHost>::Data) -> Result<(), Error>;

/// The element/pad/data model surface this core consumes (spec §6,
/// "consumed" half). A host implements this once over its own element,
/// pad, and buffer/event types.
pub trait GraphHost: Sized + 'static {
    type Element: Copy + Eq + Hash + Debug + 'static;
    type Pad: Copy + Eq + Hash + Debug + 'static;
    type Data;

    fn element_state(&self, element: Self::Element) -> ElementState;
    fn element_pads(&self, element: Self::Element) -> Vec<Self::Pad>;
    fn element_loopfunc(&self, element: Self::Element) -> Option<LoopFn<Self>>;
    fn element_flags(&self, element: Self::Element) -> ElementFlags;
    fn element_name(&self, element: Self::Element) -> String;

    fn pad_direction(&self, pad: Self::Pad) -> Direction;
    fn pad_parent(&self, pad: Self::Pad) -> Self::Element;
    fn pad_peer(&self, pad: Self::Pad) -> Option<Self::Pad>;
    fn pad_getfunc(&self, pad: Self::Pad) -> Option<GetFn<Self>>;
    fn pad_chainfunc(&self, pad: Self::Pad) -> Option<ChainFn<Self>>;
    fn pad_eventfunc(&self, pad: Self::Pad) -> Option<EventFn<Self>>;
    fn pad_name(&self, pad: Self::Pad) -> String;

    fn data_unref(&self, data: Self::Data);
    fn data_is_event(&self, data: &Self::Data) -> bool;
    fn event_is_discont(&self, data: &Self::Data) -> bool;
    fn event_new_discont(
        &self,
        valid_time: bool,
        time: u64,
        valid_offset: bool,
        offset: u64,
    ) -> Self::Data;
    /// Timestamp/offset of a buffer data unit. Not itself named in spec
    /// §6, but required by `get_buffer`'s DISCONT synthesis rule ("a
    /// fresh discontinuity event carrying the buffer's timestamp and/or
    /// byte-offset") — the spec's collaborator list omits the accessor
    /// that rule depends on, so this fills the gap the way the source's
    /// `GST_BUFFER_TIMESTAMP`/`GST_BUFFER_OFFSET` macros do.
    fn buffer_timing(&self, data: &Self::Data) -> BufferTiming;

    fn clock_get_time(&self) -> Result<u64, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferTiming {
    pub valid_time: bool,
    pub time: u64,
    pub valid_offset: bool,
    pub offset: u64,
}
