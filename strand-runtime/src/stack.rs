//! Stack arena: one owned stack segment plus its saved execution context
//!
//! This is the only module that talks to the `generator` crate. Everything
//! above it sees three operations: create a context over a fresh stack,
//! switch into it, and (from inside) switch back out. Dropping a context
//! releases its stack.
//!
//! # Reclaiming a suspended context
//!
//! Dropping a context that is parked at a suspension point unwinds its body
//! on its own stack before the memory is returned, so destructors owned by
//! the body still run. The scheduler only ever does this from the main
//! context, on a pass where nothing is executing.

use crate::error::{Error, Result};
use generator::{Generator, Gn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use strand_common::config;

/// Result of switching into a context
#[derive(Debug)]
pub(crate) enum Switch {
    /// The body suspended itself and can be resumed later
    Suspended,
    /// The body returned; the context must not be resumed again
    Finished,
    /// The body panicked; the payload was caught at the switch
    Panicked(Box<dyn Any + Send>),
}

/// An owned stack segment paired with its execution context
pub(crate) struct StackContext {
    gen: Generator<'static, (), ()>,
    stack_size: usize,
}

impl StackContext {
    /// Allocate a stack of `stack_size` bytes and prepare `entry` to run on it.
    ///
    /// Nothing runs until the first [`resume`](Self::resume).
    pub(crate) fn new<F>(stack_size: usize, entry: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let stack_size = stack_size.max(config::MIN_STACK_SIZE);
        // The generator crate sizes stacks in machine words; an odd count
        // turns on usage tracking, which we don't want.
        let words = (stack_size / std::mem::size_of::<usize>()) & !1;

        let gen = panic::catch_unwind(AssertUnwindSafe(move || Gn::<()>::new_opt(words, entry)))
            .map_err(|payload| Error::StackAlloc(panic_message(payload.as_ref())))?;

        Ok(Self { gen, stack_size })
    }

    /// Switch from the caller's context into this one.
    ///
    /// Returns once the body suspends, returns, or panics.
    pub(crate) fn resume(&mut self) -> Switch {
        if self.gen.is_done() {
            return Switch::Finished;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.gen.resume())) {
            Ok(_) if self.gen.is_done() => Switch::Finished,
            Ok(_) => Switch::Suspended,
            Err(payload) => Switch::Panicked(payload),
        }
    }

    /// Size of the owned stack in bytes
    #[inline]
    pub(crate) fn stack_size(&self) -> usize {
        self.stack_size
    }
}

/// Switch from the running context back to whoever resumed it.
///
/// Must only be called from inside a body started by [`StackContext::new`].
#[inline]
pub(crate) fn suspend() {
    generator::yield_with(());
}

/// Best-effort rendering of a panic payload for logs
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_to_completion() {
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();
        let mut ctx = StackContext::new(config::DEFAULT_STACK_SIZE, move || {
            h.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

        assert!(!ctx.gen.is_done());
        assert!(matches!(ctx.resume(), Switch::Finished));
        assert!(ctx.gen.is_done());
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        // Resuming a finished context never re-enters the body
        assert!(matches!(ctx.resume(), Switch::Finished));
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_suspend_and_resume() {
        let step = Arc::new(AtomicU32::new(0));
        let s = step.clone();
        let mut ctx = StackContext::new(config::DEFAULT_STACK_SIZE, move || {
            s.store(1, Ordering::Relaxed);
            suspend();
            s.store(2, Ordering::Relaxed);
            suspend();
            s.store(3, Ordering::Relaxed);
        })
        .unwrap();

        assert!(matches!(ctx.resume(), Switch::Suspended));
        assert_eq!(step.load(Ordering::Relaxed), 1);
        assert!(matches!(ctx.resume(), Switch::Suspended));
        assert_eq!(step.load(Ordering::Relaxed), 2);
        assert!(matches!(ctx.resume(), Switch::Finished));
        assert_eq!(step.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_panic_is_caught() {
        let mut ctx = StackContext::new(config::DEFAULT_STACK_SIZE, || {
            panic!("boom");
        })
        .unwrap();

        match ctx.resume() {
            Switch::Panicked(payload) => assert_eq!(panic_message(payload.as_ref()), "boom"),
            other => panic!("expected panic, got {:?}", other),
        }
    }

    #[test]
    fn test_drop_suspended_runs_destructors() {
        struct Flag(Arc<AtomicU32>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(1, Ordering::Relaxed);
            }
        }

        let dropped = Arc::new(AtomicU32::new(0));
        let d = dropped.clone();
        let mut ctx = StackContext::new(config::DEFAULT_STACK_SIZE, move || {
            let _flag = Flag(d);
            suspend();
            unreachable!("context is reclaimed while parked");
        })
        .unwrap();

        assert!(matches!(ctx.resume(), Switch::Suspended));
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
        drop(ctx);
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_stack_size_floor() {
        let ctx = StackContext::new(1024, || {}).unwrap();
        assert_eq!(ctx.stack_size(), config::MIN_STACK_SIZE);
    }
}
