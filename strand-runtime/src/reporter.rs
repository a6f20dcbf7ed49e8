//! Result reporter for parent/child coroutines
//!
//! A reporter is shared between a parent coroutine (which reads it after
//! being resumed) and the scheduler's completion/timeout paths (which write
//! it). It also carries the payload handed to the child as its argument.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use strand_common::Outcome;
use tracing::trace;

/// Outcome channel as seen by the scheduler
///
/// The scheduler stores reporters type-erased behind this trait; callers
/// normally use the concrete [`Reporter`].
pub trait Report: Send + Sync {
    /// Record the child's outcome
    fn set_result(&self, outcome: Outcome);

    /// The recorded outcome, if any
    fn result(&self) -> Option<Outcome>;
}

/// Outcome slot plus the payload given to the child
pub struct Reporter<D> {
    result: AtomicU8,
    data: Arc<D>,
}

impl<D> Reporter<D> {
    /// Create a reporter carrying `data` as the child's argument
    pub fn new(data: D) -> Arc<Self> {
        Arc::new(Self {
            result: AtomicU8::new(Outcome::UNSET),
            data: Arc::new(data),
        })
    }

    /// The payload shared with the child
    #[inline]
    pub fn data(&self) -> &Arc<D> {
        &self.data
    }

    /// The recorded outcome, if any
    #[inline]
    pub fn outcome(&self) -> Option<Outcome> {
        Outcome::from_raw(self.result.load(Ordering::Acquire))
    }

    /// Whether the child completed (normally or by panicking)
    pub fn is_done(&self) -> bool {
        self.outcome().is_some_and(Outcome::is_finished)
    }

    /// Whether the parent gave up waiting
    pub fn is_timeout(&self) -> bool {
        self.outcome() == Some(Outcome::Timeout)
    }

    /// Forget the recorded outcome so the reporter can serve another child
    pub fn reset(&self) {
        self.result.store(Outcome::UNSET, Ordering::Release);
    }
}

impl Reporter<()> {
    /// Reporter with no payload
    pub fn empty() -> Arc<Self> {
        Self::new(())
    }
}

impl<D: Send + Sync> Report for Reporter<D> {
    fn set_result(&self, outcome: Outcome) {
        let prev = self.result.swap(outcome as u8, Ordering::AcqRel);
        if prev != Outcome::UNSET {
            trace!(
                "reporter overwritten: {:?} -> {:?}",
                Outcome::from_raw(prev),
                outcome
            );
        }
    }

    fn result(&self) -> Option<Outcome> {
        self.outcome()
    }
}

impl<D> fmt::Debug for Reporter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("result", &Outcome::from_raw(self.result.load(Ordering::Relaxed)))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_by_default() {
        let r = Reporter::new(7u32);
        assert_eq!(r.result(), None);
        assert!(!r.is_done());
        assert!(!r.is_timeout());
        assert_eq!(**r.data(), 7);
    }

    #[test]
    fn test_set_result() {
        let r = Reporter::empty();
        r.set_result(Outcome::Done);
        assert_eq!(r.result(), Some(Outcome::Done));
        assert!(r.is_done());

        r.reset();
        assert_eq!(r.result(), None);

        r.set_result(Outcome::Timeout);
        assert!(r.is_timeout());
        assert!(!r.is_done());
    }

    #[test]
    fn test_panicked_counts_as_done() {
        let r = Reporter::empty();
        r.set_result(Outcome::Panicked);
        assert!(r.is_done());
    }

    #[test]
    fn test_type_erased() {
        let r = Reporter::new(String::from("payload"));
        let erased: Arc<dyn Report> = r.clone();
        erased.set_result(Outcome::Done);
        assert_eq!(r.result(), Some(Outcome::Done));
    }

    static_assertions::assert_impl_all!(Reporter<u64>: Send, Sync);
}
