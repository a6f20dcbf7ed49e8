//! Selector integration
//!
//! Event sources that are not coroutines (timers, channels, inboxes fed
//! from other threads) register here and get polled once per scheduler
//! pass, before the scheduling decision. Registrations are non-owning: the
//! registry keeps a [`Weak`] and never extends the object's lifetime.

use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// A pollable event source driven by the scheduler loop
///
/// `poll` is called on the scheduler's own thread with a zero timeout and
/// must not block. It runs on the main context, never inside a coroutine,
/// so it may create coroutines or wake suspended ones.
pub trait Selectable {
    fn poll(&self, timeout: Duration);
}

/// Registration key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SelectorKey(usize);

impl SelectorKey {
    /// Key from an arbitrary caller-chosen handle
    pub const fn new(handle: usize) -> Self {
        Self(handle)
    }

    /// Key derived from the object's address
    pub fn of(object: &Rc<dyn Selectable>) -> Self {
        Self(Rc::as_ptr(object) as *const () as usize)
    }
}

impl fmt::Debug for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SelectorKey({:#x})", self.0)
    }
}

/// Registered selectables, polled in registration order
#[derive(Default)]
pub(crate) struct SelectorRegistry {
    entries: Vec<(SelectorKey, Weak<dyn Selectable>)>,
}

impl SelectorRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a non-owning entry; duplicate keys are logged and ignored
    pub(crate) fn register(&mut self, key: SelectorKey, object: &Rc<dyn Selectable>) -> bool {
        if self.entries.iter().any(|(k, _)| *k == key) {
            warn!("register_selector failed: key already exists: {:?}", key);
            return false;
        }

        self.entries.push((key, Rc::downgrade(object)));
        debug!("register_selector ok: {:?}", key);
        true
    }

    /// Remove an entry; absent keys are logged and ignored
    pub(crate) fn unregister(&mut self, key: SelectorKey) -> bool {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                self.entries.remove(pos);
                debug!("unregister_selector ok: {:?}", key);
                true
            }
            None => {
                warn!("unregister_selector failed: key not found: {:?}", key);
                false
            }
        }
    }

    /// Live objects in registration order; dead registrations are pruned
    pub(crate) fn snapshot(&mut self) -> Vec<Rc<dyn Selectable>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(key, weak)| match weak.upgrade() {
            Some(object) => {
                live.push(object);
                true
            }
            None => {
                debug!("pruning dropped selectable {:?}", key);
                false
            }
        });
        live
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
