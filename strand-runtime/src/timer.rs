// SPDX-License-Identifier: GPL-2.0-only
// Copyright (C) 2024 Ankit Kumar Pandey <ankitkpandey1@gmail.com>

//! Periodic and one-shot timers driven by the scheduler loop
//!
//! A [`Timer`] is a [`Selectable`]: the loop polls it every pass and, once
//! its interval has elapsed, the callback is started as a fresh coroutine.
//! The callback therefore may sleep, yield or spawn like any other body.

use crate::coroutine::deadline_after;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::selector::{Selectable, SelectorKey};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Timer polled by a scheduler
pub struct Timer {
    scheduler: Weak<Scheduler>,
    interval: Duration,
    callback: Callback,
    running: Cell<bool>,
    once: Cell<bool>,
    next_fire: Cell<Option<Instant>>,
    fired: Cell<u64>,
    key: Cell<Option<SelectorKey>>,
}

impl Timer {
    /// Create a stopped timer bound to `scheduler`
    pub fn new<F>(scheduler: &Rc<Scheduler>, interval: Duration, callback: F) -> Rc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Rc::new(Self {
            scheduler: Rc::downgrade(scheduler),
            interval,
            callback: Arc::new(callback),
            running: Cell::new(false),
            once: Cell::new(false),
            next_fire: Cell::new(None),
            fired: Cell::new(0),
            key: Cell::new(None),
        })
    }

    /// Arm the timer. With `once`, it stops itself after the first firing.
    ///
    /// The first firing is one interval from now.
    pub fn start(self: &Rc<Self>, once: bool) -> Result<()> {
        if self.running.get() {
            warn!("timer start ignored: already running");
            return Err(Error::AlreadyRunning);
        }
        if self.interval.is_zero() {
            warn!("timer start failed: zero interval");
            return Err(Error::InvalidInterval);
        }

        let scheduler = self.scheduler.upgrade().ok_or(Error::NoScheduler)?;
        if self.key.get().is_none() {
            let object: Rc<dyn Selectable> = self.clone();
            let key = SelectorKey::of(&object);
            scheduler.register_selector(key, &object);
            self.key.set(Some(key));
        }

        self.once.set(once);
        self.next_fire.set(Some(deadline_after(Instant::now(), self.interval)));
        self.running.set(true);
        debug!("timer started: interval {:?}, once {}", self.interval, once);
        Ok(())
    }

    /// Disarm the timer. It stays registered and can be started again.
    pub fn stop(&self) -> Result<()> {
        if !self.running.get() {
            debug!("timer stop ignored: not running");
            return Err(Error::NotRunning);
        }
        self.running.set(false);
        self.next_fire.set(None);
        debug!("timer stopped after {} firing(s)", self.fired.get());
        Ok(())
    }

    /// Disarm the timer and remove it from its scheduler
    pub fn abandon(&self) {
        if self.running.get() {
            let _ = self.stop();
        }
        if let Some(key) = self.key.take() {
            if let Some(scheduler) = self.scheduler.upgrade() {
                scheduler.unregister_selector(key);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Number of times the callback was started
    pub fn fired(&self) -> u64 {
        self.fired.get()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Selectable for Timer {
    fn poll(&self, _timeout: Duration) {
        if !self.running.get() {
            return;
        }
        let Some(due) = self.next_fire.get() else {
            return;
        };
        let now = Instant::now();
        if now < due {
            return;
        }

        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        let callback = self.callback.clone();
        match scheduler.create(move |()| callback(), ()) {
            Ok(id) => trace!("timer fired: {}", id),
            Err(e) => warn!("timer callback not started: {}", e),
        }
        self.fired.set(self.fired.get() + 1);

        if self.once.get() {
            let _ = self.stop();
        } else {
            // Missed intervals are not replayed
            self.next_fire.set(Some(deadline_after(now, self.interval)));
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.abandon();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("interval", &self.interval)
            .field("running", &self.running.get())
            .field("once", &self.once.get())
            .field("fired", &self.fired.get())
            .finish()
    }
}
