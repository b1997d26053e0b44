//! Cooperative, stackful coroutines on a single OS thread.
//!
//! This crate implements C1 (arch stack primitive) and C2 (cothread
//! runtime) of the scheduler core described in `SPEC_FULL.md`. It has no
//! knowledge of elements, pads, or links — [`scheduler`](../scheduler)
//! builds the dataflow policy on top of the primitives exposed here.
//!
//! Grounded in `kernel/src/task` of the teacher repository: the same
//! callee-saved-register save/restore discipline, generalized from a
//! kernel task table to a single in-process cothread arena.

pub mod arch;
mod context;
mod error;
mod stack;

pub use context::{Context, ContextConfig, Cothread, DEFAULT_MAX_COTHREADS, DEFAULT_STACK_SIZE};
pub use error::CothreadError;
pub use stack::{Stack, MIN_STACK_SIZE};
