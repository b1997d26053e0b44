//! Pad link state (C4): the per-link single-slot mailbox plus
//! writer/reader blocking discipline.
//!
//! Grounded in `examples/original_source/gst/schedulers/entryscheduler.c`
//! (`get_buffer`'s DISCONT synthesis) and the link-private struct implied
//! throughout that file. The `bufpen` itself, and invariants I1-I4, are
//! exactly spec.md §3/§4.4; `LinkId` is this crate's own arena key
//! (links have no inherent host identity — they are created by
//! `scheduler_pad_link`), generated the way
//! `kernel/src/task/global_scheduler.rs` hands out `TaskId`s.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use cothread::Cothread;

use crate::error::Error;
use crate::queue::CothreadQueue;
use crate::traits::GraphHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

struct LinkState<H: GraphHost> {
    src_pad: H::Pad,
    sink_pad: H::Pad,
    bufpen: Option<H::Data>,
    need_discont: bool,
    waiting_writer: Option<Cothread>,
    waiting_reader: Option<Cothread>,
}

/// Outcome of a blocking [`LinkTable::push`]: either the data was handed
/// off, or the wait was cancelled before that happened, handing the data
/// back so the caller can dispose of it (the link never took ownership).
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<D> {
    Delivered,
    Interrupted(D),
}

/// Outcome of a blocking [`LinkTable::pull`]: either data arrived, or the
/// wait was cancelled before any did.
#[derive(Debug, PartialEq, Eq)]
pub enum PullOutcome<D> {
    Data(D),
    Interrupted,
}

pub struct LinkTable<H: GraphHost> {
    next_id: AtomicU64,
    links: BTreeMap<LinkId, LinkState<H>>,
}

impl<H: GraphHost> LinkTable<H> {
    pub fn new() -> LinkTable<H> {
        LinkTable {
            next_id: AtomicU64::new(0),
            links: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, src_pad: H::Pad, sink_pad: H::Pad) -> LinkId {
        let id = LinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.links.insert(
            id,
            LinkState {
                src_pad,
                sink_pad,
                bufpen: None,
                need_discont: false,
                waiting_writer: None,
                waiting_reader: None,
            },
        );
        id
    }

    pub fn src_pad(&self, link: LinkId) -> H::Pad {
        self.links[&link].src_pad
    }

    pub fn sink_pad(&self, link: LinkId) -> H::Pad {
        self.links[&link].sink_pad
    }

    pub fn find_by_src(&self, pad: H::Pad) -> Option<LinkId> {
        self.links
            .iter()
            .find(|(_, l)| l.src_pad == pad)
            .map(|(id, _)| *id)
    }

    pub fn find_by_sink(&self, pad: H::Pad) -> Option<LinkId> {
        self.links
            .iter()
            .find(|(_, l)| l.sink_pad == pad)
            .map(|(id, _)| *id)
    }

    pub fn is_full(&self, link: LinkId) -> bool {
        self.links[&link].bufpen.is_some()
    }

    pub fn waiting_writer(&self, link: LinkId) -> Option<Cothread> {
        self.links[&link].waiting_writer
    }

    pub fn waiting_reader(&self, link: LinkId) -> Option<Cothread> {
        self.links[&link].waiting_reader
    }

    /// Sets `need_discont` on `link`, per the element lifecycle rule:
    /// every link of every pad of an element gets this set on its
    /// `PLAYING -> PAUSED` transition.
    pub fn mark_need_discont(&mut self, link: LinkId) {
        self.links.get_mut(&link).expect("unknown link").need_discont = true;
    }

    /// Used by the chain-handler installed on the src pad of the link:
    /// block while `bufpen` is full, then store `data`. Honours
    /// [`crate::policy::Scheduler::interrupt`] (spec §5): a cancellation
    /// observed while `bufpen` is still full hands `data` back as
    /// [`PushOutcome::Interrupted`] rather than delivering it. A
    /// cancellation that races a real drain of `bufpen` never wins — the
    /// drain is what actually happened, so `push` proceeds to store the
    /// data normally instead of abandoning a wait that in fact succeeded.
    pub fn push(
        &mut self,
        link: LinkId,
        queue: &mut CothreadQueue,
        current: Cothread,
        data: H::Data,
    ) -> Result<PushOutcome<H::Data>, Error> {
        let mut data = Some(data);
        loop {
            let state = self.links.get_mut(&link).expect("unknown link");
            if state.bufpen.is_some() {
                if state.waiting_writer.is_some() {
                    return Err(Error::ConcurrentAccess {
                        link: format!("{link:?}"),
                        role: "writer",
                    });
                }
                if queue.take_cancelled(current) {
                    return Ok(PushOutcome::Interrupted(data.take().expect("data not yet consumed")));
                }
                state.waiting_writer = Some(current);
                queue.sleep(current, None)?;

                let cancelled = queue.take_cancelled(current);
                let state = self.links.get_mut(&link).expect("unknown link");
                if state.waiting_writer == Some(current) {
                    state.waiting_writer = None;
                }
                if cancelled && state.bufpen.is_some() {
                    return Ok(PushOutcome::Interrupted(data.take().expect("data not yet consumed")));
                }
                continue;
            }

            state.bufpen = Some(data.take().expect("data consumed exactly once"));
            let reader = state.waiting_reader.take();
            if let Some(reader) = reader {
                queue.awake(reader, 0);
            }
            return Ok(PushOutcome::Delivered);
        }
    }

    /// Used by the get-handler installed on the sink pad of the link:
    /// block while `bufpen` is empty, then take the data. Honours
    /// cancellation the same way [`LinkTable::push`] does: a real buffer
    /// that arrives in the same window as a cancellation is always
    /// delivered rather than abandoned.
    pub fn pull(
        &mut self,
        link: LinkId,
        queue: &mut CothreadQueue,
        current: Cothread,
    ) -> Result<PullOutcome<H::Data>, Error> {
        loop {
            let state = self.links.get_mut(&link).expect("unknown link");
            if let Some(data) = state.bufpen.take() {
                let writer = state.waiting_writer.take();
                if let Some(writer) = writer {
                    queue.awake(writer, 0);
                }
                return Ok(PullOutcome::Data(data));
            }

            if state.waiting_reader.is_some() {
                return Err(Error::ConcurrentAccess {
                    link: format!("{link:?}"),
                    role: "reader",
                });
            }
            if queue.take_cancelled(current) {
                return Ok(PullOutcome::Interrupted);
            }
            state.waiting_reader = Some(current);
            queue.sleep(current, None)?;

            let cancelled = queue.take_cancelled(current);
            let state = self.links.get_mut(&link).expect("unknown link");
            if state.waiting_reader == Some(current) {
                state.waiting_reader = None;
            }
            if cancelled && state.bufpen.is_none() {
                return Ok(PullOutcome::Interrupted);
            }
            continue;
        }
    }

    /// Non-blocking dequeue used by the chain wrapper (C5). If
    /// `need_discont` is set and `bufpen` holds a buffer (not an event),
    /// synthesises a DISCONT event carrying the buffer's timing and
    /// leaves `bufpen` untouched so the buffer is delivered next call.
    /// Two consecutive DISCONT events collapse to one: if `bufpen`
    /// already holds a DISCONT event, the flag is simply cleared.
    pub fn get_buffer(&mut self, link: LinkId, queue: &mut CothreadQueue, host: &H) -> Option<H::Data> {
        let state = self.links.get_mut(&link).expect("unknown link");

        if state.need_discont {
            if let Some(pending) = &state.bufpen {
                if host.data_is_event(pending) {
                    if host.event_is_discont(pending) {
                        state.need_discont = false;
                    }
                    // A non-DISCONT event is delivered as-is; the
                    // pending discontinuity carries over to the buffer
                    // that eventually follows it.
                } else {
                    let timing = host.buffer_timing(pending);
                    state.need_discont = false;
                    return Some(host.event_new_discont(
                        timing.valid_time,
                        timing.time,
                        timing.valid_offset,
                        timing.offset,
                    ));
                }
            }
        }

        let data = state.bufpen.take()?;
        let writer = state.waiting_writer.take();
        if let Some(writer) = writer {
            queue.awake(writer, 0);
        }
        Some(data)
    }

    /// Registers `current` as the link's waiting reader without sleeping,
    /// so a later wake (from the writer side filling `bufpen`) reaches a
    /// cothread blocked in a multi-link select rather than a plain
    /// single-link `pull`.
    pub fn set_waiting_reader(&mut self, link: LinkId, current: Cothread) {
        self.links.get_mut(&link).expect("unknown link").waiting_reader = Some(current);
    }

    /// Clears the waiting-reader slot without taking any data, used once
    /// a multi-link select has been satisfied by one of the candidates to
    /// un-register from the others.
    pub fn clear_waiting_reader(&mut self, link: LinkId, current: Cothread) {
        let state = self.links.get_mut(&link).expect("unknown link");
        if state.waiting_reader == Some(current) {
            state.waiting_reader = None;
        }
    }

    /// Tears down a link: drops any pending `bufpen` data (I4) and
    /// returns the endpoints so the caller can destroy orphaned
    /// cothreads. The Open Question on `pad_disconnect` (DESIGN.md)
    /// resolves to exactly this: a correct unlink, not a stub.
    pub fn remove(&mut self, link: LinkId, host: &H) -> Option<(H::Pad, H::Pad)> {
        let state = self.links.remove(&link)?;
        if let Some(data) = state.bufpen {
            log::warn!("link {link:?} unlinked with data still pending; dropping it");
            host.data_unref(data);
        }
        Some((state.src_pad, state.sink_pad))
    }
}

impl<H: GraphHost> Default for LinkTable<H> {
    fn default() -> Self {
        Self::new()
    }
}
