use thiserror::Error;

/// Errors the scheduler core can raise. Recoverable-at-link conditions
/// (synthesised DISCONT) never appear here — they are handled locally in
/// [`crate::link`]. Everything below is surfaced to the host by
/// `iterate()` returning [`crate::iterate::Status::Error`].
#[derive(Debug, Error)]
pub enum Error {
    /// An element removed its loop/chain/get function during execution,
    /// removed a pad during a get, or unlinked a pad during a get.
    #[error("element {element:?} misbehaved: {detail}")]
    ElementMisbehavior { element: String, detail: String },

    /// `schedule_now` was non-empty but no runnable entry existed after a
    /// full forward walk. This crate's run queue (`crate::queue`) only
    /// ever enqueues a cothread it has already determined is runnable
    /// (on `push`/`pull`/`awake`), so the forward-walk-finds-nothing
    /// failure mode spec §4.6/§7 describes has no equivalent state to
    /// detect here; kept for taxonomy completeness with the spec, not
    /// currently constructed.
    #[error("scheduler is stuck: nothing runnable in schedule_now")]
    SchedulingStuck,

    /// A writer pushed while `bufpen` was already full without honouring
    /// the sleep-on-full protocol. Should be unreachable under the sleep
    /// discipline; treated as a fatal diagnostic.
    #[error("bufpen overwrite on link {link:?}")]
    BufpenOverwrite { link: String },

    /// Two cothreads were observed as writer (or as reader) on the same
    /// link at once.
    #[error("concurrent {role} access on link {link:?}")]
    ConcurrentAccess { link: String, role: &'static str },

    /// A cothread-runtime failure surfaced to the scheduler: the
    /// context's capacity was exceeded, a stack allocation failed, or a
    /// switch targeted an invalid cothread. Any of these rejects the
    /// graph change (or scheduling step) that triggered it.
    #[error(transparent)]
    Cothread(#[from] cothread::CothreadError),

    /// The clock object was mismatched or unavailable.
    #[error("clock error: {0}")]
    ClockError(String),
}
