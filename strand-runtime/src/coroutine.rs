//! The coroutine record: state machine, suspend bookkeeping, parent/child links
//!
//! A [`Coroutine`] is owned by its scheduler's table. Parent and child are
//! stored as non-owning [`CoroutineId`]s, so either side may disappear
//! without leaving a dangling reference behind: a stale id simply no longer
//! resolves.
//!
//! The completion/timeout paths only touch the deadline, the links and the
//! reporter, never the stack context.

use crate::reporter::Report;
use crate::stack::StackContext;
use crate::table::CoroutineId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_common::{CoroutineState, Outcome};
use tracing::debug;

/// Returned by [`Coroutine::wait`] while a deadline is pending
const DEADLINE_PENDING: u32 = 1;

/// Stand-in for deadlines too far out for `Instant` (about a century)
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + after`, clamped instead of overflowing.
///
/// A deadline past the clamp only ends through [`Coroutine::wake`] or a
/// finishing child in practice.
pub(crate) fn deadline_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE.min(after)))
        .unwrap_or(now)
}

/// A single cooperative task
pub(crate) struct Coroutine {
    pub(crate) id: CoroutineId,
    pub(crate) state: CoroutineState,
    /// Taken out while the coroutine is executing, so the scheduler never
    /// holds a borrow of the table across a switch.
    pub(crate) context: Option<StackContext>,
    /// Remaining scheduler ticks before the coroutine is runnable again
    pub(crate) yield_wait: u32,
    /// Absolute deadline; `None` means no deadline
    pub(crate) yield_to: Option<Instant>,
    pub(crate) parent: Option<CoroutineId>,
    pub(crate) child: Option<CoroutineId>,
    pub(crate) reporter: Option<Arc<dyn Report>>,
}

impl Coroutine {
    pub(crate) fn new(id: CoroutineId, context: StackContext) -> Self {
        Self {
            id,
            state: CoroutineState::Ready,
            context: Some(context),
            yield_wait: 0,
            yield_to: None,
            parent: None,
            child: None,
            reporter: None,
        }
    }

    /// Remaining blocked ticks as of `now`; `0` means runnable.
    ///
    /// Consumes one tick of a pending yield per call, so it must be called
    /// exactly once per coroutine per scheduling pass.
    pub(crate) fn wait(&mut self, now: Instant) -> u32 {
        if self.yield_wait > 0 {
            let remaining = self.yield_wait;
            self.yield_wait -= 1;
            return remaining;
        }

        match self.yield_to {
            Some(deadline) if deadline > now => DEADLINE_PENDING,
            _ => 0,
        }
    }

    /// Called right before the coroutine is resumed.
    ///
    /// A deadline that is still set at this point expired without the child
    /// finishing: record a timeout, clear the deadline and hand back the
    /// child so the caller can reap it.
    pub(crate) fn yield_over(&mut self) -> Option<CoroutineId> {
        self.yield_to.take()?;

        let child = self.child.take()?;
        debug!("{}: wait timed out, abandoning child {}", self.id, child);
        if let Some(reporter) = &self.reporter {
            reporter.set_result(Outcome::Timeout);
        }
        Some(child)
    }

    /// Called on the parent when its child's body returns.
    ///
    /// Clears the deadline so the next resume is not mistaken for a timeout.
    pub(crate) fn child_finished(&mut self, outcome: Outcome) {
        debug!("{}: child finished ({:?})", self.id, outcome);
        if let Some(reporter) = &self.reporter {
            reporter.set_result(outcome);
        }
        self.yield_to = None;
        self.child = None;
    }

    /// Clear every reason the coroutine is blocked
    pub(crate) fn wake(&mut self) {
        self.yield_wait = 0;
        self.yield_to = None;
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.state == CoroutineState::Running
    }
}
