// SPDX-License-Identifier: GPL-2.0-only
// Copyright (C) 2024 Ankit Kumar Pandey <ankitkpandey1@gmail.com>

//! Thread-local access to the scheduler driving the current thread
//!
//! While a scheduler is inside `pick_and_run` or `run_forever` it is
//! installed as the thread's current scheduler. Coroutine bodies use the
//! free functions here instead of holding a handle to the scheduler.
//!
//! The suspending functions only keep the scheduler handle for their
//! bookkeeping and drop it before switching out, so a parked coroutine never
//! keeps its own scheduler alive.

use crate::error::{Error, Result};
use crate::reporter::{Report, Reporter};
use crate::scheduler::Scheduler;
use crate::stack;
use crate::table::CoroutineId;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use strand_common::Outcome;

thread_local! {
    static CURRENT: RefCell<Option<Rc<Scheduler>>> = const { RefCell::new(None) };
}

/// Restores the previously installed scheduler on drop
pub(crate) struct EnterGuard {
    prev: Option<Rc<Scheduler>>,
}

/// Install `scheduler` as the current scheduler until the guard drops
pub(crate) fn enter(scheduler: &Rc<Scheduler>) -> EnterGuard {
    let prev = CURRENT.with(|c| c.replace(Some(scheduler.clone())));
    EnterGuard { prev }
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        // Drop the displaced handle outside the borrow
        let _displaced = CURRENT.with(|c| c.replace(prev));
    }
}

/// The scheduler driving the current thread, if any
pub fn try_current() -> Option<Rc<Scheduler>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// The scheduler driving the current thread
pub fn current() -> Result<Rc<Scheduler>> {
    try_current().ok_or(Error::NoScheduler)
}

/// Create a coroutine on the current scheduler
pub fn spawn<F>(body: F) -> Result<CoroutineId>
where
    F: FnOnce() + Send + 'static,
{
    current()?.create(move |()| body(), ())
}

/// Create a coroutine on the current scheduler, passing `arg` to `body`
pub fn spawn_with<A, F>(body: F, arg: A) -> Result<CoroutineId>
where
    F: FnOnce(A) + Send + 'static,
    A: Send + 'static,
{
    current()?.create(body, arg)
}

/// Create a child of the running coroutine
///
/// Typically followed by [`wait_child`].
pub fn spawn_child<D, F>(body: F, reporter: Arc<Reporter<D>>) -> Result<CoroutineId>
where
    D: Send + Sync + 'static,
    F: FnOnce(Arc<D>) + Send + 'static,
{
    current()?.create_child(body, reporter)
}

/// Give up the processor for `ticks` scheduling passes
///
/// Outside a coroutine, or with `ticks == 0`, returns immediately.
pub fn yield_now(ticks: u32) {
    let parked = match try_current() {
        Some(s) => s.park_ticks(ticks),
        None => false,
    };
    if parked {
        stack::suspend();
    }
}

/// Suspend the running coroutine for at least `duration`
///
/// Ends early if the coroutine's child finishes or someone wakes it.
pub fn sleep(duration: Duration) {
    let parked = match try_current() {
        Some(s) => s.park_until(duration),
        None => false,
    };
    if parked {
        stack::suspend();
    }
}

/// Wait up to `timeout` for the running coroutine's child to finish.
///
/// Returns the outcome recorded in the reporter, or `None` if there is no
/// reporter attached or the wait was cut short without an outcome (for
/// example by [`wake`]). Returns immediately when the child already finished.
pub fn wait_child(timeout: Duration) -> Option<Outcome> {
    let reporter = {
        let s = try_current()?;
        let reporter = s.current_reporter()?;
        if let Some(outcome) = reporter.result() {
            return Some(outcome);
        }
        if !s.park_until(timeout) {
            return reporter.result();
        }
        reporter
    };

    stack::suspend();
    reporter.result()
}

/// Reporter attached to the running coroutine
pub fn current_reporter() -> Option<Arc<dyn Report>> {
    try_current()?.current_reporter()
}

/// Id of the running coroutine
pub fn current_id() -> Option<CoroutineId> {
    try_current()?.current()
}

/// Make a suspended coroutine runnable on the next pass
pub fn wake(id: CoroutineId) -> bool {
    try_current().is_some_and(|s| s.wake(id))
}
