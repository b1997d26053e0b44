//! End-to-end pipeline scenarios from `SPEC_FULL.md` §11 (spec §8's
//! testable properties), exercised through the public `Scheduler` API
//! rather than any one module's internals — these are the acceptance
//! tests for the whole crate, grounded in the same scenarios
//! `entryscheduler.c`/`faircothreads.c`'s own test harnesses describe.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use element_scheduler::{
    BufferTiming, ChainFn, ClockWaitResult, Direction, ElementFlags, ElementState, EventFn, GetFn,
    GraphHost, LoopFn, Scheduler, StateTransition, Status,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Data {
    Buffer { timestamp: u64 },
    Event { discont: bool },
}

/// A minimal element/pad graph host: elements and pads are plain `u32`
/// ids, everything else lives in `RefCell`-guarded tables since the
/// `GraphHost` trait only ever hands out `&Host`. Good enough to drive
/// the scheduler end to end without pulling in a real buffer/pad crate.
pub struct Host {
    state: RefCell<HashMap<u32, ElementState>>,
    flags: HashMap<u32, ElementFlags>,
    names: HashMap<u32, &'static str>,
    pad_names: HashMap<u32, &'static str>,
    pad_dir: HashMap<u32, Direction>,
    pad_parent: HashMap<u32, u32>,
    pad_peer: RefCell<HashMap<u32, u32>>,
    element_pads: HashMap<u32, Vec<u32>>,
    loopfuncs: HashMap<u32, LoopFn<Host>>,
    getfuncs: HashMap<u32, GetFn<Host>>,
    chainfuncs: HashMap<u32, ChainFn<Host>>,
    eventfuncs: HashMap<u32, EventFn<Host>>,

    // Test-scenario state.
    src_next_timestamp: RefCell<HashMap<u32, u64>>,
    src_remaining: RefCell<HashMap<u32, u32>>,
    sink_log: RefCell<HashMap<u32, Vec<Data>>>,
    clock: Cell<u64>,
    get_calls: RefCell<HashMap<u32, u32>>,
    phase: Cell<u32>,
    interrupt_observed: Cell<bool>,
}

impl Host {
    fn new() -> Host {
        Host {
            state: RefCell::new(HashMap::new()),
            flags: HashMap::new(),
            names: HashMap::new(),
            pad_names: HashMap::new(),
            pad_dir: HashMap::new(),
            pad_parent: HashMap::new(),
            pad_peer: RefCell::new(HashMap::new()),
            element_pads: HashMap::new(),
            loopfuncs: HashMap::new(),
            getfuncs: HashMap::new(),
            chainfuncs: HashMap::new(),
            eventfuncs: HashMap::new(),
            src_next_timestamp: RefCell::new(HashMap::new()),
            src_remaining: RefCell::new(HashMap::new()),
            sink_log: RefCell::new(HashMap::new()),
            clock: Cell::new(0),
            get_calls: RefCell::new(HashMap::new()),
            phase: Cell::new(0),
            interrupt_observed: Cell::new(false),
        }
    }

    fn add_element(&mut self, id: u32, name: &'static str) {
        self.state.borrow_mut().insert(id, ElementState::Null);
        self.flags.insert(id, ElementFlags::empty());
        self.names.insert(id, name);
        self.element_pads.insert(id, Vec::new());
    }

    fn add_pad(&mut self, id: u32, parent: u32, direction: Direction, name: &'static str) {
        self.pad_dir.insert(id, direction);
        self.pad_parent.insert(id, parent);
        self.pad_names.insert(id, name);
        self.element_pads.get_mut(&parent).unwrap().push(id);
    }

    fn link(&mut self, src: u32, sink: u32) {
        self.pad_peer.borrow_mut().insert(src, sink);
        self.pad_peer.borrow_mut().insert(sink, src);
    }

    fn set_state(&self, element: u32, state: ElementState) {
        self.state.borrow_mut().insert(element, state);
    }

    fn sink_received(&self, pad: u32) -> Vec<Data> {
        self.sink_log.borrow().get(&pad).cloned().unwrap_or_default()
    }
}

fn src_get(host: &Host, _element: u32, pad: u32) -> Option<Data> {
    let mut remaining = host.src_remaining.borrow_mut();
    let left = remaining.entry(pad).or_insert(6);
    if *left == 0 {
        return None;
    }
    *left -= 1;
    let mut next = host.src_next_timestamp.borrow_mut();
    let ts = next.entry(pad).or_insert(0);
    let value = *ts;
    *ts += 10;
    Some(Data::Buffer { timestamp: value })
}

fn sink_chain(host: &Host, _element: u32, pad: u32, data: Data) -> Result<(), element_scheduler::Error> {
    host.sink_log.borrow_mut().entry(pad).or_default().push(data);
    Ok(())
}

fn sink_event(host: &Host, _element: u32, pad: u32, data: Data) -> Result<(), element_scheduler::Error> {
    host.sink_log.borrow_mut().entry(pad).or_default().push(data);
    Ok(())
}

impl GraphHost for Host {
    type Element = u32;
    type Pad = u32;
    type Data = Data;

    fn element_state(&self, element: u32) -> ElementState {
        self.state.borrow()[&element]
    }
    fn element_pads(&self, element: u32) -> Vec<u32> {
        self.element_pads.get(&element).cloned().unwrap_or_default()
    }
    fn element_loopfunc(&self, element: u32) -> Option<LoopFn<Self>> {
        self.loopfuncs.get(&element).copied()
    }
    fn element_flags(&self, element: u32) -> ElementFlags {
        self.flags.get(&element).copied().unwrap_or(ElementFlags::empty())
    }
    fn element_name(&self, element: u32) -> String {
        self.names.get(&element).map(|s| s.to_string()).unwrap_or_default()
    }

    fn pad_direction(&self, pad: u32) -> Direction {
        self.pad_dir[&pad]
    }
    fn pad_parent(&self, pad: u32) -> u32 {
        self.pad_parent[&pad]
    }
    fn pad_peer(&self, pad: u32) -> Option<u32> {
        self.pad_peer.borrow().get(&pad).copied()
    }
    fn pad_getfunc(&self, pad: u32) -> Option<GetFn<Self>> {
        self.getfuncs.get(&pad).copied()
    }
    fn pad_chainfunc(&self, pad: u32) -> Option<ChainFn<Self>> {
        self.chainfuncs.get(&pad).copied()
    }
    fn pad_eventfunc(&self, pad: u32) -> Option<EventFn<Self>> {
        self.eventfuncs.get(&pad).copied()
    }
    fn pad_name(&self, pad: u32) -> String {
        self.pad_names.get(&pad).map(|s| s.to_string()).unwrap_or_default()
    }

    fn data_unref(&self, _data: Data) {}
    fn data_is_event(&self, data: &Data) -> bool {
        matches!(data, Data::Event { .. })
    }
    fn event_is_discont(&self, data: &Data) -> bool {
        matches!(data, Data::Event { discont: true })
    }
    fn event_new_discont(&self, _valid_time: bool, _time: u64, _valid_offset: bool, _offset: u64) -> Data {
        Data::Event { discont: true }
    }
    fn buffer_timing(&self, data: &Data) -> BufferTiming {
        match *data {
            Data::Buffer { timestamp } => BufferTiming {
                valid_time: true,
                time: timestamp,
                valid_offset: false,
                offset: 0,
            },
            Data::Event { .. } => BufferTiming::default(),
        }
    }
    fn clock_get_time(&self) -> Result<u64, element_scheduler::Error> {
        Ok(self.clock.get())
    }
}

const SRC: u32 = 1;
const SINK: u32 = 2;
const SRC_PAD: u32 = 10;
const SINK_PAD: u32 = 11;

/// Builds a two-element `Src(get) -> Sink(chain)` graph and brings both
/// elements up to `Playing`, matching spec §8 scenario 1's setup.
fn playing_chain_graph() -> Scheduler<Host> {
    let mut host = Host::new();
    host.add_element(SRC, "src");
    host.add_element(SINK, "sink");
    host.add_pad(SRC_PAD, SRC, Direction::Src, "src");
    host.add_pad(SINK_PAD, SINK, Direction::Sink, "sink");
    host.link(SRC_PAD, SINK_PAD);
    host.getfuncs.insert(SRC_PAD, src_get);
    host.chainfuncs.insert(SINK_PAD, sink_chain);
    host.eventfuncs.insert(SINK_PAD, sink_event);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(SRC);
    scheduler.add_element(SINK);
    scheduler.pad_link(SRC_PAD, SINK_PAD);

    for &element in &[SRC, SINK] {
        scheduler.host().set_state(element, ElementState::Ready);
        scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
        scheduler.host().set_state(element, ElementState::Paused);
        scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
    }
    for &element in &[SRC, SINK] {
        scheduler.host().set_state(element, ElementState::Playing);
        scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
    }
    scheduler
}

fn run_until<F: Fn(&Scheduler<Host>) -> bool>(scheduler: &mut Scheduler<Host>, max_ticks: usize, done: F) {
    for _ in 0..max_ticks {
        if done(scheduler) {
            return;
        }
        match scheduler.iterate() {
            Status::Running => {}
            Status::Stopped => return,
            Status::Error => panic!("scheduler entered Error: {:?}", scheduler.host()),
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}

fn buffer_count(received: &[Data]) -> usize {
    received.iter().filter(|d| matches!(d, Data::Buffer { .. })).count()
}

fn discont_count(received: &[Data]) -> usize {
    received.iter().filter(|d| matches!(d, Data::Event { discont: true })).count()
}

#[test]
fn scenario_1_chain_based_pipeline_delivers_buffers_in_order() {
    let _ = env_logger::try_init();
    let mut scheduler = playing_chain_graph();

    run_until(&mut scheduler, 200, |s| buffer_count(&s.host().sink_received(SINK_PAD)) >= 3);

    let received = scheduler.host().sink_received(SINK_PAD);
    let timestamps: Vec<u64> = received
        .iter()
        .filter_map(|d| match d {
            Data::Buffer { timestamp } => Some(*timestamp),
            Data::Event { .. } => None,
        })
        .collect();
    assert_eq!(&timestamps[..3], &[0, 10, 20]);
}

#[test]
fn scenario_2_discont_synthesised_again_after_playing_to_paused() {
    let mut scheduler = playing_chain_graph();

    // Drain past the single DISCONT the initial READY->PAUSED transition
    // armed, plus a couple of ordinary buffers, so need_discont is
    // definitely clear before we pause again.
    run_until(&mut scheduler, 200, |s| buffer_count(&s.host().sink_received(SINK_PAD)) >= 2);
    let baseline = scheduler.host().sink_received(SINK_PAD);
    assert_eq!(discont_count(&baseline), 1, "exactly one DISCONT from the initial transition: {baseline:?}");

    // Spec §3: a PLAYING->PAUSED pause re-arms need_discont on every link
    // of the element's pads, not just the first READY->PAUSED transition.
    scheduler.host().set_state(SRC, ElementState::Paused);
    scheduler.state_transition(SRC, StateTransition::PlayingToPaused).unwrap();
    scheduler.host().set_state(SRC, ElementState::Playing);
    scheduler.state_transition(SRC, StateTransition::PausedToPlaying).unwrap();

    run_until(&mut scheduler, 200, |s| buffer_count(&s.host().sink_received(SINK_PAD)) >= 4);

    let received = scheduler.host().sink_received(SINK_PAD);
    assert_eq!(discont_count(&received), 2, "a second DISCONT must appear after the pause/resume: {received:?}");

    // The fresh DISCONT must be delivered strictly before the next buffer
    // that follows the pause point, not after it.
    let second_discont = received
        .iter()
        .enumerate()
        .filter(|(_, d)| matches!(d, Data::Event { discont: true }))
        .nth(1)
        .map(|(i, _)| i)
        .unwrap();
    let third_buffer_index = received
        .iter()
        .enumerate()
        .filter(|(_, d)| matches!(d, Data::Buffer { .. }))
        .nth(2)
        .map(|(i, _)| i)
        .unwrap();
    assert!(second_discont < third_buffer_index);
}

#[test]
fn scenario_4_pad_select_prefers_ready_pad_and_ignores_idle_peer() {
    // Exercised at the `LinkTable`/`pad_select` level through a loop
    // element with two sink pads; see `src/policy.rs`'s own `pad_select`
    // for the blocking/interrupt contract covered at the unit level.
    // Here we only confirm the end-to-end plumbing: data queued on pad A
    // alone is delivered without requiring pad B to ever produce.
    const LOOP_ELEM: u32 = 3;
    const FEEDER: u32 = 4;
    const PAD_A: u32 = 20;
    const PAD_B: u32 = 21;
    const FEEDER_PAD: u32 = 22;

    fn feeder_get(host: &Host, _element: u32, pad: u32) -> Option<Data> {
        let mut left = host.src_remaining.borrow_mut();
        let remaining = left.entry(pad).or_insert(1);
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(Data::Buffer { timestamp: 0 })
    }

    fn loop_main(host: &Host, element: u32) {
        let pads = [PAD_A, PAD_B];
        match element_scheduler::pad_select::<Host>(&pads) {
            Ok(element_scheduler::PadSelectResult::Data(pad, data)) => {
                host.sink_log.borrow_mut().entry(pad).or_default().push(data);
            }
            Ok(element_scheduler::PadSelectResult::Interrupted) => {}
            Err(_) => {}
        }
        let _ = element;
    }

    let mut host = Host::new();
    host.add_element(LOOP_ELEM, "loop");
    host.add_element(FEEDER, "feeder");
    host.add_pad(PAD_A, LOOP_ELEM, Direction::Sink, "a");
    host.add_pad(PAD_B, LOOP_ELEM, Direction::Sink, "b");
    host.add_pad(FEEDER_PAD, FEEDER, Direction::Src, "out");
    host.link(FEEDER_PAD, PAD_A);
    host.getfuncs.insert(FEEDER_PAD, feeder_get);
    host.loopfuncs.insert(LOOP_ELEM, loop_main);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(LOOP_ELEM);
    scheduler.add_element(FEEDER);
    scheduler.pad_link(FEEDER_PAD, PAD_A);

    for &element in &[LOOP_ELEM, FEEDER] {
        scheduler.host().set_state(element, ElementState::Ready);
        scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
        scheduler.host().set_state(element, ElementState::Paused);
        scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
    }
    for &element in &[LOOP_ELEM, FEEDER] {
        scheduler.host().set_state(element, ElementState::Playing);
        scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
    }

    run_until(&mut scheduler, 200, |s| !s.host().sink_received(PAD_A).is_empty());

    assert_eq!(scheduler.host().sink_received(PAD_A).len(), 1);
    assert!(scheduler.host().sink_received(PAD_B).is_empty());
}

#[test]
fn scenario_6_clock_wait_resumes_earlier_deadline_first() {
    const WAITER_50: u32 = 5;
    const WAITER_100: u32 = 6;

    fn waiter_50(host: &Host, element: u32) {
        if let Ok(ClockWaitResult::Woken { jitter }) = element_scheduler::clock_wait::<Host>(50) {
            host.sink_log.borrow_mut().entry(element).or_default().push(Data::Buffer { timestamp: jitter });
        }
    }
    fn waiter_100(host: &Host, element: u32) {
        if let Ok(ClockWaitResult::Woken { jitter }) = element_scheduler::clock_wait::<Host>(100) {
            host.sink_log.borrow_mut().entry(element).or_default().push(Data::Buffer { timestamp: jitter });
        }
    }

    let mut host = Host::new();
    host.add_element(WAITER_50, "waiter50");
    host.add_element(WAITER_100, "waiter100");
    host.loopfuncs.insert(WAITER_50, waiter_50);
    host.loopfuncs.insert(WAITER_100, waiter_100);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(WAITER_50);
    scheduler.add_element(WAITER_100);

    for &element in &[WAITER_50, WAITER_100] {
        scheduler.host().set_state(element, ElementState::Ready);
        scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
        scheduler.host().set_state(element, ElementState::Paused);
        scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
    }
    for &element in &[WAITER_50, WAITER_100] {
        scheduler.host().set_state(element, ElementState::Playing);
        scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
    }

    // Both cothreads run once and go to sleep in clock_wait before the
    // clock has advanced past either deadline.
    for _ in 0..4 {
        if let Status::Error = scheduler.iterate() {
            panic!("unexpected scheduler error");
        }
    }
    assert!(scheduler.host().sink_received(WAITER_50).is_empty());
    assert!(scheduler.host().sink_received(WAITER_100).is_empty());

    // Advance the clock past 50ms only: the 50ms waiter must resume
    // first, strictly before the 100ms waiter does.
    scheduler.host().clock.set(55);
    run_until(&mut scheduler, 50, |s| !s.host().sink_received(WAITER_50).is_empty());
    assert!(!scheduler.host().sink_received(WAITER_50).is_empty());
    assert!(scheduler.host().sink_received(WAITER_100).is_empty());
    let jitter = match scheduler.host().sink_received(WAITER_50)[0] {
        Data::Buffer { timestamp } => timestamp,
        _ => unreachable!(),
    };
    assert!(jitter <= 55);

    // Now advance past 100ms: the second waiter resumes too.
    scheduler.host().clock.set(110);
    run_until(&mut scheduler, 50, |s| !s.host().sink_received(WAITER_100).is_empty());
    assert!(!scheduler.host().sink_received(WAITER_100).is_empty());
}

#[test]
fn scenario_3_backpressure_blocks_writer_without_losing_or_overwriting_data() {
    // A Sink whose chain function is slow relative to the Src's get
    // cadence: the single-slot bufpen between them forces the Src's get
    // cothread to block on push rather than overwrite, so every buffer
    // still arrives, in order, once the Sink works through the backlog.
    fn slow_sink_chain(
        host: &Host,
        _element: u32,
        pad: u32,
        data: Data,
    ) -> Result<(), element_scheduler::Error> {
        std::thread::sleep(std::time::Duration::from_millis(1));
        host.sink_log.borrow_mut().entry(pad).or_default().push(data);
        Ok(())
    }

    let mut scheduler = {
        let mut host = Host::new();
        host.add_element(SRC, "src");
        host.add_element(SINK, "sink");
        host.add_pad(SRC_PAD, SRC, Direction::Src, "src");
        host.add_pad(SINK_PAD, SINK, Direction::Sink, "sink");
        host.link(SRC_PAD, SINK_PAD);
        host.getfuncs.insert(SRC_PAD, src_get);
        host.chainfuncs.insert(SINK_PAD, slow_sink_chain);
        host.eventfuncs.insert(SINK_PAD, sink_event);

        let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
        scheduler.add_element(SRC);
        scheduler.add_element(SINK);
        scheduler.pad_link(SRC_PAD, SINK_PAD);

        for &element in &[SRC, SINK] {
            scheduler.host().set_state(element, ElementState::Ready);
            scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
            scheduler.host().set_state(element, ElementState::Paused);
            scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
        }
        for &element in &[SRC, SINK] {
            scheduler.host().set_state(element, ElementState::Playing);
            scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
        }
        scheduler
    };

    // `src_get`'s default supply is 6 buffers; drive enough iterations
    // for the Sink to drain all of them through the slow chain function.
    run_until(&mut scheduler, 2000, |s| buffer_count(&s.host().sink_received(SINK_PAD)) >= 6);

    let received = scheduler.host().sink_received(SINK_PAD);
    assert_eq!(buffer_count(&received), 6, "no buffer lost or duplicated under backpressure: {received:?}");
    let timestamps: Vec<u64> = received
        .iter()
        .filter_map(|d| match d {
            Data::Buffer { timestamp } => Some(*timestamp),
            Data::Event { .. } => None,
        })
        .collect();
    assert_eq!(timestamps, vec![0, 10, 20, 30, 40, 50], "buffer order preserved across the backlog");
}

#[test]
fn scenario_5_async_awake_from_foreign_thread_wakes_next_iterate() {
    const SLEEPER: u32 = 7;

    fn sleeper_main(host: &Host, element: u32) {
        // Parks on a deadline nothing in this test ever reaches; the
        // only way out is an explicit awake, from whatever thread.
        let _ = element_scheduler::clock_wait::<Host>(u64::MAX);
        host.sink_log.borrow_mut().entry(element).or_default().push(Data::Buffer { timestamp: 0 });
    }

    let mut host = Host::new();
    host.add_element(SLEEPER, "sleeper");
    host.loopfuncs.insert(SLEEPER, sleeper_main);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(SLEEPER);

    scheduler.host().set_state(SLEEPER, ElementState::Ready);
    scheduler.state_transition(SLEEPER, StateTransition::NullToReady).unwrap();
    scheduler.host().set_state(SLEEPER, ElementState::Paused);
    scheduler.state_transition(SLEEPER, StateTransition::ReadyToPaused).unwrap();
    scheduler.host().set_state(SLEEPER, ElementState::Playing);
    scheduler.state_transition(SLEEPER, StateTransition::PausedToPlaying).unwrap();

    // One tick: the cothread runs once and parks itself in clock_wait.
    assert!(matches!(scheduler.iterate(), Status::Running));
    assert!(scheduler.host().sink_received(SLEEPER).is_empty());

    let ct = scheduler.element_cothread(SLEEPER).expect("sleeper has a cothread by now");
    let handle = scheduler.async_handle();
    let poster = std::thread::spawn(move || {
        // Give the iterate thread a chance to go idle on the async
        // condvar before posting the wake, per the scenario's framing.
        std::thread::sleep(std::time::Duration::from_millis(10));
        handle.awake_async(ct, 1);
    });

    run_until(&mut scheduler, 50, |s| !s.host().sink_received(SLEEPER).is_empty());
    assert!(
        !scheduler.host().sink_received(SLEEPER).is_empty(),
        "awake_async from a foreign thread must reach the run list on a later iterate()"
    );

    poster.join().unwrap();
}

#[test]
fn scheduler_show_reports_every_element() {
    let scheduler = playing_chain_graph();
    let dump = scheduler.show();
    assert!(dump.contains("src"));
    assert!(dump.contains("sink"));
}

#[test]
fn get_wrapper_retires_after_end_of_stream_instead_of_busy_spinning() {
    fn counting_src_get(host: &Host, _element: u32, pad: u32) -> Option<Data> {
        *host.get_calls.borrow_mut().entry(pad).or_insert(0) += 1;
        let mut remaining = host.src_remaining.borrow_mut();
        let left = remaining.entry(pad).or_insert(3);
        if *left == 0 {
            return None;
        }
        *left -= 1;
        Some(Data::Buffer { timestamp: 0 })
    }

    let mut host = Host::new();
    host.add_element(SRC, "src");
    host.add_element(SINK, "sink");
    host.add_pad(SRC_PAD, SRC, Direction::Src, "src");
    host.add_pad(SINK_PAD, SINK, Direction::Sink, "sink");
    host.link(SRC_PAD, SINK_PAD);
    host.getfuncs.insert(SRC_PAD, counting_src_get);
    host.chainfuncs.insert(SINK_PAD, sink_chain);
    host.eventfuncs.insert(SINK_PAD, sink_event);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(SRC);
    scheduler.add_element(SINK);
    scheduler.pad_link(SRC_PAD, SINK_PAD);

    for &element in &[SRC, SINK] {
        scheduler.host().set_state(element, ElementState::Ready);
        scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
        scheduler.host().set_state(element, ElementState::Paused);
        scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
    }
    for &element in &[SRC, SINK] {
        scheduler.host().set_state(element, ElementState::Playing);
        scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
    }

    run_until(&mut scheduler, 200, |s| buffer_count(&s.host().sink_received(SINK_PAD)) >= 3);

    // Drive well past exhaustion; a busy-spinning getfunc would keep the
    // call count climbing forever instead of settling.
    for _ in 0..20 {
        let _ = scheduler.iterate();
    }
    let calls_after_settling = scheduler.host().get_calls.borrow()[&SRC_PAD];

    for _ in 0..50 {
        let _ = scheduler.iterate();
    }
    let calls_final = scheduler.host().get_calls.borrow()[&SRC_PAD];

    assert_eq!(
        calls_final, calls_after_settling,
        "getfunc must not be called again once it has reported end-of-stream"
    );
}

#[test]
fn scheduler_interrupt_does_not_leak_into_a_later_unrelated_pad_select() {
    const LOOP_ELEM: u32 = 8;
    const FEEDER: u32 = 9;
    const PAD_A: u32 = 30;
    const PAD_B: u32 = 31;
    const FEEDER_PAD: u32 = 32;

    fn feeder_get(host: &Host, _element: u32, pad: u32) -> Option<Data> {
        let mut left = host.src_remaining.borrow_mut();
        let remaining = left.entry(pad).or_insert(1);
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(Data::Buffer { timestamp: 99 })
    }

    fn loop_main(host: &Host, element: u32) {
        if host.phase.get() == 0 {
            if let Ok(ClockWaitResult::Interrupted) = element_scheduler::clock_wait::<Host>(u64::MAX) {
                host.interrupt_observed.set(true);
            }
            host.phase.set(1);
            return;
        }
        let pads = [PAD_A, PAD_B];
        if let Ok(element_scheduler::PadSelectResult::Data(pad, data)) =
            element_scheduler::pad_select::<Host>(&pads)
        {
            host.sink_log.borrow_mut().entry(pad).or_default().push(data);
        }
        let _ = element;
    }

    let mut host = Host::new();
    host.add_element(LOOP_ELEM, "loop");
    host.add_element(FEEDER, "feeder");
    host.add_pad(PAD_A, LOOP_ELEM, Direction::Sink, "a");
    host.add_pad(PAD_B, LOOP_ELEM, Direction::Sink, "b");
    host.add_pad(FEEDER_PAD, FEEDER, Direction::Src, "out");
    host.link(FEEDER_PAD, PAD_A);
    host.getfuncs.insert(FEEDER_PAD, feeder_get);
    host.loopfuncs.insert(LOOP_ELEM, loop_main);

    let mut scheduler = Scheduler::new(host, element_scheduler::ContextConfig::default());
    scheduler.add_element(LOOP_ELEM);
    scheduler.add_element(FEEDER);
    scheduler.pad_link(FEEDER_PAD, PAD_A);

    for &element in &[LOOP_ELEM, FEEDER] {
        scheduler.host().set_state(element, ElementState::Ready);
        scheduler.state_transition(element, StateTransition::NullToReady).unwrap();
        scheduler.host().set_state(element, ElementState::Paused);
        scheduler.state_transition(element, StateTransition::ReadyToPaused).unwrap();
    }
    for &element in &[LOOP_ELEM, FEEDER] {
        scheduler.host().set_state(element, ElementState::Playing);
        scheduler.state_transition(element, StateTransition::PausedToPlaying).unwrap();
    }

    // One tick: LOOP_ELEM's cothread runs phase 0 and parks in clock_wait
    // on a deadline nothing in this test ever reaches.
    assert!(matches!(scheduler.iterate(), Status::Running));
    assert_eq!(scheduler.host().phase.get(), 0);

    // Interrupt it while it is blocked in clock_wait, not pad_select: a
    // cancellation delivered outside pad_select must still be observed
    // there, and must not go on to leak into the unrelated pad_select
    // wait this cothread moves to next.
    assert!(scheduler.interrupt(LOOP_ELEM));

    run_until(&mut scheduler, 200, |s| s.host().interrupt_observed.get());
    assert!(scheduler.host().interrupt_observed.get());
    assert_eq!(scheduler.host().phase.get(), 1);

    run_until(&mut scheduler, 200, |s| buffer_count(&s.host().sink_received(PAD_A)) >= 1);

    let received = scheduler.host().sink_received(PAD_A);
    assert_eq!(
        buffer_count(&received),
        1,
        "data delivered after the interrupt must still reach pad_select, not be swallowed by a stale cancellation: {received:?}"
    );
}
