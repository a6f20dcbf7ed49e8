// SPDX-License-Identifier: GPL-2.0-only
// Copyright (C) 2024 Ankit Kumar Pandey <ankitkpandey1@gmail.com>

//! Multi-thread engine
//!
//! An [`Engine`] runs one [`Scheduler`] per OS thread. Schedulers never move
//! between threads and coroutines never migrate; other threads hand work to
//! a scheduler through its inbox, a channel the scheduler polls as a
//! selectable at the top of every pass.

use crate::error::{Error, Result};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerStats, StopHandle};
use crate::selector::Selectable;
use crate::table::CoroutineId;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::num::NonZeroUsize;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;
use strand_common::config;
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;
type ReadyHook = Arc<dyn Fn(usize, ThreadId) + Send + Sync>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of scheduler threads (default: number of CPUs)
    pub num_threads: usize,

    /// Scheduler thread name prefix
    pub name_prefix: String,

    /// Configuration of every scheduler
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            name_prefix: config::THREAD_NAME_PREFIX.to_string(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Engine builder
pub struct Builder {
    config: EngineConfig,
    on_ready: Option<ReadyHook>,
}

impl Builder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            on_ready: None,
        }
    }

    /// Set the number of scheduler threads
    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = n.max(1);
        self
    }

    /// Set the thread name prefix
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Set the per-coroutine stack size of every scheduler
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.scheduler.stack_size = bytes;
        self
    }

    /// Set the idle sleep of every scheduler
    pub fn idle_sleep(mut self, idle: Duration) -> Self {
        self.config.scheduler.idle_sleep = idle;
        self
    }

    /// Set the configuration shared by every scheduler
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.config.scheduler = config;
        self
    }

    /// Called once on each scheduler thread, right before its loop starts
    pub fn on_thread_ready<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, ThreadId) + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(hook));
        self
    }

    /// Build the engine (threads not yet started)
    pub fn build(self) -> Engine {
        Engine {
            config: self.config,
            on_ready: self.on_ready,
            threads: Vec::new(),
            next: AtomicUsize::new(0),
            stopped: false,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Work handed to a scheduler thread
enum Command {
    Spawn(Job),
    Wake(CoroutineId),
}

/// Channel receiver polled by the scheduler that owns it
struct Inbox {
    rx: Receiver<Command>,
    scheduler: Weak<Scheduler>,
}

impl Selectable for Inbox {
    fn poll(&self, _timeout: Duration) {
        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Spawn(job) => {
                    if let Err(e) = scheduler.create(move |()| job(), ()) {
                        warn!("inbox spawn dropped: {}", e);
                    }
                }
                Command::Wake(id) => {
                    scheduler.wake(id);
                }
            }
        }
    }
}

/// Thread-ready rendezvous
struct Ready {
    state: Mutex<ReadyState>,
    cond: Condvar,
}

struct ReadyState {
    arrived: usize,
    stats: Vec<Option<Arc<SchedulerStats>>>,
}

impl Ready {
    fn new(n: usize) -> Self {
        Self {
            state: Mutex::new(ReadyState {
                arrived: 0,
                stats: vec![None; n],
            }),
            cond: Condvar::new(),
        }
    }

    fn wait_for(&self, n: usize) {
        let mut state = self.state.lock();
        while state.arrived < n {
            self.cond.wait(&mut state);
        }
    }
}

/// Counts a thread as arrived even if its setup panics
struct Arrival {
    ready: Arc<Ready>,
    index: usize,
    stats: Option<Arc<SchedulerStats>>,
}

impl Drop for Arrival {
    fn drop(&mut self) {
        let mut state = self.ready.state.lock();
        state.arrived += 1;
        state.stats[self.index] = self.stats.take();
        self.ready.cond.notify_all();
    }
}

/// One scheduler thread as seen from outside
struct SchedulerThread {
    tx: Sender<Command>,
    stop: StopHandle,
    tid: Arc<AtomicU32>,
    stats: Option<Arc<SchedulerStats>>,
    handle: Option<JoinHandle<()>>,
}

/// Pool of scheduler threads
pub struct Engine {
    config: EngineConfig,
    on_ready: Option<ReadyHook>,
    threads: Vec<SchedulerThread>,
    next: AtomicUsize,
    stopped: bool,
}

impl Engine {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Get the engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the number of scheduler threads
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    pub fn is_started(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Spawn every scheduler thread and block until all of them are ready.
    pub fn start(&mut self) -> Result<()> {
        if self.is_started() {
            warn!("engine start ignored: already started");
            return Err(Error::AlreadyRunning);
        }

        let n = self.config.num_threads.max(1);
        let ready = Arc::new(Ready::new(n));

        for index in 0..n {
            match self.spawn_thread(index, &ready) {
                Ok(thread) => self.threads.push(thread),
                Err(e) => {
                    warn!("engine start failed on thread {}: {}", index, e);
                    // Threads already spawned still arrive; then tear them down
                    ready.wait_for(index);
                    self.shutdown();
                    self.threads.clear();
                    return Err(e);
                }
            }
        }

        ready.wait_for(n);
        let mut state = ready.state.lock();
        for (thread, stats) in self.threads.iter_mut().zip(state.stats.iter_mut()) {
            thread.stats = stats.take();
        }
        drop(state);

        self.stopped = false;
        info!("engine started with {} scheduler thread(s)", n);
        Ok(())
    }

    fn spawn_thread(&self, index: usize, ready: &Arc<Ready>) -> Result<SchedulerThread> {
        let (tx, rx) = channel::unbounded();
        let stop = StopHandle::new();
        let tid = Arc::new(AtomicU32::new(0));

        let config = self.config.scheduler.clone();
        let on_ready = self.on_ready.clone();
        let ready = ready.clone();
        let thread_stop = stop.clone();
        let thread_tid = tid.clone();

        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", self.config.name_prefix, index))
            .spawn(move || {
                let mut arrival = Arrival {
                    ready,
                    index,
                    stats: None,
                };

                let scheduler = Scheduler::builder()
                    .config(config)
                    .stop_handle(thread_stop)
                    .build();
                let inbox: Rc<dyn Selectable> = Rc::new(Inbox {
                    rx,
                    scheduler: Rc::downgrade(&scheduler),
                });
                scheduler.register_object(&inbox);

                thread_tid.store(get_tid(), Ordering::Release);
                arrival.stats = Some(scheduler.stats().clone());
                debug!("scheduler thread {} ready (tid {})", index, get_tid());

                if let Some(hook) = &on_ready {
                    hook(index, std::thread::current().id());
                }
                drop(arrival);

                scheduler.run_forever();
                scheduler.unregister_object(&inbox);
            })?;

        Ok(SchedulerThread {
            tx,
            stop,
            tid,
            stats: None,
            handle: Some(handle),
        })
    }

    fn thread(&self, index: usize) -> Result<&SchedulerThread> {
        if !self.is_started() || self.stopped {
            return Err(Error::NotStarted);
        }
        self.threads.get(index).ok_or(Error::InvalidThread(index))
    }

    /// Create a coroutine on scheduler thread `index`.
    ///
    /// Creation happens on that thread during its next selector poll.
    pub fn spawn_on<F>(&self, index: usize, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.thread(index)?
            .tx
            .send(Command::Spawn(Box::new(body)))
            .map_err(|_| Error::Disconnected)
    }

    /// Create a coroutine on the next scheduler thread, round-robin
    pub fn spawn<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.spawn_on(index, body)
    }

    /// Wake coroutine `id` living on scheduler thread `index`
    pub fn wake_on(&self, index: usize, id: CoroutineId) -> Result<()> {
        self.thread(index)?
            .tx
            .send(Command::Wake(id))
            .map_err(|_| Error::Disconnected)
    }

    /// OS thread ids of the scheduler threads, in index order
    pub fn thread_tids(&self) -> Vec<u32> {
        self.threads
            .iter()
            .map(|t| t.tid.load(Ordering::Acquire))
            .collect()
    }

    /// Statistics of scheduler thread `index`
    pub fn stats(&self, index: usize) -> Option<&Arc<SchedulerStats>> {
        self.threads.get(index)?.stats.as_ref()
    }

    /// Stop every scheduler and join its thread
    pub fn stop(&mut self) {
        if self.stopped || !self.is_started() {
            warn!("engine stop ignored: not running");
            return;
        }
        self.shutdown();
        self.stopped = true;
        info!("engine stopped");
    }

    fn shutdown(&mut self) {
        for thread in &self.threads {
            thread.stop.stop();
        }
        for (index, thread) in self.threads.iter_mut().enumerate() {
            if let Some(handle) = thread.handle.take() {
                if handle.join().is_err() {
                    warn!("scheduler thread {} panicked", index);
                }
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_started() && !self.stopped {
            self.stop();
        }
    }
}

/// Get the current OS thread ID (TID)
#[cfg(target_os = "linux")]
pub fn get_tid() -> u32 {
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
pub fn get_tid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let engine = Engine::builder().build();
        assert!(engine.num_threads() >= 1);
        assert_eq!(engine.config().name_prefix, config::THREAD_NAME_PREFIX);
        assert!(!engine.is_started());
    }

    #[test]
    fn test_builder_clamps_threads() {
        let engine = Engine::builder().num_threads(0).build();
        assert_eq!(engine.num_threads(), 1);
    }

    #[test]
    fn test_spawn_before_start() {
        let engine = Engine::builder().num_threads(1).build();
        assert!(matches!(engine.spawn(|| {}), Err(Error::NotStarted)));
        assert!(matches!(engine.spawn_on(0, || {}), Err(Error::NotStarted)));
    }

    #[test]
    fn test_invalid_thread_index() {
        let mut engine = Engine::builder().num_threads(1).build();
        engine.start().unwrap();
        assert!(matches!(
            engine.spawn_on(3, || {}),
            Err(Error::InvalidThread(3))
        ));
        engine.stop();
    }

    #[test]
    fn test_stop_twice() {
        let mut engine = Engine::builder()
            .num_threads(1)
            .idle_sleep(Duration::from_millis(1))
            .build();
        engine.start().unwrap();
        engine.stop();
        engine.stop();
        assert!(matches!(engine.spawn(|| {}), Err(Error::NotStarted)));
    }

    #[test]
    fn test_tids_recorded() {
        let mut engine = Engine::builder()
            .num_threads(2)
            .idle_sleep(Duration::from_millis(1))
            .build();
        engine.start().unwrap();

        let tids = engine.thread_tids();
        assert_eq!(tids.len(), 2);
        assert!(tids.iter().all(|&tid| tid != 0));
        assert!(engine.stats(0).is_some());
        engine.stop();
    }

    static_assertions::assert_impl_all!(Engine: Send);
}
