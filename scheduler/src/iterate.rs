//! The iteration driver (C7): one tick of the scheduler.
//!
//! Grounded in `gst_fair_scheduler_iterate`'s shape: drain the waiting
//! list of anything whose clock deadline has passed, then let the
//! cothread queue run (or idle) for one step, then translate the
//! outcome into a status the host's own main loop can act on.

use crate::policy::Scheduler;
use crate::traits::GraphHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// At least one element is Playing; call `iterate` again.
    Running,
    /// No element is Playing; there is nothing left to schedule.
    Stopped,
    /// An element misbehaved or the cothread runtime failed. The error
    /// itself was already logged; call `Scheduler::take_last_error` for
    /// detail before resetting state and trying again.
    Error,
}

impl<H: GraphHost> Scheduler<H> {
    /// Runs one scheduling step: wakes any clock-waiters whose deadline
    /// has passed, then switches into the next runnable element cothread
    /// (if any), or idles briefly if none is runnable yet.
    pub fn iterate(&mut self) -> Status {
        if self.has_error() {
            return Status::Error;
        }

        self.drain_waiting();

        match self.run_queue_tick() {
            Ok(_) => {
                if self.has_error() {
                    Status::Error
                } else if self.is_playing() {
                    Status::Running
                } else {
                    Status::Stopped
                }
            }
            Err(e) => {
                log::error!("cothread queue iteration failed: {e}");
                self.record_error(e);
                Status::Error
            }
        }
    }

    /// The error that put this scheduler into [`Status::Error`], if any,
    /// consuming it so the host can inspect it once.
    pub fn take_last_error(&mut self) -> Option<crate::error::Error> {
        self.take_error()
    }
}
