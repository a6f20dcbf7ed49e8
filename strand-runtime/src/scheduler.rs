//! Per-thread coroutine scheduler
//!
//! A [`Scheduler`] owns the live set of coroutines for one OS thread, the
//! deferred-free set, and the selector registry. Its loop alternates two
//! steps every pass: poll the registered selectables, then pick the first
//! runnable coroutine (in creation order) and switch into it.
//!
//! # Borrowing across switches
//!
//! Coroutine bodies call back into the scheduler (to yield, wait, or create
//! children) while the scheduler is in the middle of `pick_and_run`. The
//! scheduler therefore never holds a borrow of its core across a switch:
//! the running coroutine's context is moved out of the table before the
//! switch and put back afterwards.
//!
//! # Reclamation
//!
//! Finished and orphaned coroutines are moved into the deferred-free set
//! and only dropped at the start of the next pass, when nothing is
//! executing on any coroutine stack.

use crate::context;
use crate::coroutine::{deadline_after, Coroutine};
use crate::error::{Error, Result};
use crate::reporter::{Report, Reporter};
use crate::selector::{Selectable, SelectorKey, SelectorRegistry};
use crate::stack::{self, StackContext, Switch};
use crate::table::{CoroutineId, Table};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_common::{config, CoroutineState, Outcome};
use tracing::{debug, info, trace, warn};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Stack size of every coroutine, in bytes
    pub stack_size: usize,

    /// How long the loop sleeps when no coroutine is live
    pub idle_sleep: Duration,

    /// Cap on live coroutines; `create` fails beyond it
    pub max_coroutines: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stack_size: config::DEFAULT_STACK_SIZE,
            idle_sleep: Duration::from_millis(config::IDLE_SLEEP_MS),
            max_coroutines: config::DEFAULT_MAX_COROUTINES,
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Coroutines created
    pub created: AtomicU64,
    /// Coroutines whose body returned or panicked
    pub finished: AtomicU64,
    /// Bodies that panicked
    pub panics: AtomicU64,
    /// Parent waits that ended in a timeout
    pub timeouts: AtomicU64,
    /// Children removed because their parent timed out
    pub orphans_reaped: AtomicU64,
    /// Scheduling passes
    pub passes: AtomicU64,
    /// Switches into a coroutine
    pub switches: AtomicU64,
}

/// Cloneable, thread-safe handle that stops a scheduler loop
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to exit at the top of its next pass.
    ///
    /// Cooperative: a coroutine that is executing keeps running until it
    /// suspends or returns.
    pub fn stop(&self) {
        if self.flag.swap(true, Ordering::AcqRel) {
            warn!("stop ignored: scheduler already stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Scheduler builder
pub struct Builder {
    config: SchedulerConfig,
    stop: Option<StopHandle>,
}

impl Builder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            stop: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-coroutine stack size in bytes
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = bytes;
        self
    }

    /// Set the idle sleep used when no coroutine is live
    pub fn idle_sleep(mut self, idle: Duration) -> Self {
        self.config.idle_sleep = idle;
        self
    }

    /// Set the live coroutine cap
    pub fn max_coroutines(mut self, n: usize) -> Self {
        self.config.max_coroutines = n;
        self
    }

    /// Use an existing stop handle (e.g. one kept by a thread pool)
    pub fn stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Rc<Scheduler> {
        Scheduler::from_parts(self.config, self.stop.unwrap_or_default())
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

struct Core {
    live: Table<Coroutine>,
    /// Coroutine currently occupying the running slot
    running: Option<CoroutineId>,
    /// Removed this pass, reclaimed at the start of the next one
    to_free: Vec<Coroutine>,
}

/// Cooperative scheduler pinned to one OS thread
///
/// Create one with [`Scheduler::new`] or [`Builder`] and drive it with
/// [`run_forever`](Self::run_forever) (or [`pick_and_run`](Self::pick_and_run)
/// step by step).
///
/// # Example
///
/// ```rust,no_run
/// use strand_runtime::{Scheduler, sleep};
/// use std::time::Duration;
///
/// let scheduler = Scheduler::new();
/// scheduler
///     .create(
///         |name: &str| {
///             sleep(Duration::from_millis(10));
///             println!("hello from {name}");
///         },
///         "worker",
///     )
///     .unwrap();
///
/// while !scheduler.done() {
///     scheduler.pick_and_run();
/// }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    core: RefCell<Core>,
    selectors: RefCell<SelectorRegistry>,
    stop: StopHandle,
    stats: Arc<SchedulerStats>,
    /// Schedulers never leave the thread that created them
    _not_send: PhantomData<*const ()>,
}

impl Scheduler {
    /// Create a scheduler with default configuration
    pub fn new() -> Rc<Self> {
        Builder::new().build()
    }

    /// Create a scheduler with the given configuration
    pub fn with_config(config: SchedulerConfig) -> Rc<Self> {
        Self::from_parts(config, StopHandle::new())
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    fn from_parts(config: SchedulerConfig, stop: StopHandle) -> Rc<Self> {
        Rc::new(Self {
            config,
            core: RefCell::new(Core {
                live: Table::new(),
                running: None,
                to_free: Vec::new(),
            }),
            selectors: RefCell::new(SelectorRegistry::new()),
            stop,
            stats: Arc::new(SchedulerStats::default()),
            _not_send: PhantomData,
        })
    }

    /// Get the scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> &Arc<SchedulerStats> {
        &self.stats
    }

    /// Handle that stops this scheduler's loop, usable from any thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a coroutine that runs `body(arg)` on its own stack.
    ///
    /// The coroutine starts Ready and first runs on a later scheduling pass;
    /// creating it never suspends the caller.
    pub fn create<A, F>(&self, body: F, arg: A) -> Result<CoroutineId>
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        let live = self.core.borrow().live.len();
        if live >= self.config.max_coroutines {
            warn!("create failed: {} coroutines live", live);
            return Err(Error::CapacityExceeded(live));
        }

        let context = StackContext::new(self.config.stack_size, move || body(arg)).map_err(|e| {
            warn!("create failed: {}", e);
            e
        })?;

        let stack_size = context.stack_size();
        let id = self
            .core
            .borrow_mut()
            .live
            .insert_with(|id| Coroutine::new(id, context));
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        trace!("created {} ({} byte stack)", id, stack_size);
        Ok(id)
    }

    /// Create a child of the running coroutine.
    ///
    /// `reporter` is attached to the running coroutine (the parent) and its
    /// payload becomes the child's argument. The child's completion, or the
    /// parent's wait deadline elapsing first, is recorded in the reporter.
    ///
    /// A parent tracks one child at a time: creating a second child replaces
    /// the link to the first.
    pub fn create_child<D, F>(&self, body: F, reporter: Arc<Reporter<D>>) -> Result<CoroutineId>
    where
        D: Send + Sync + 'static,
        F: FnOnce(Arc<D>) + Send + 'static,
    {
        let parent = {
            let core = self.core.borrow();
            let parent = core.running.ok_or(Error::NotInCoroutine)?;
            if !core.live.contains(parent) {
                return Err(Error::NotInCoroutine);
            }
            parent
        };

        let child = self.create(body, reporter.data().clone())?;

        // The parent's reporter and links only change once the child exists
        let mut core = self.core.borrow_mut();
        if let Some(co) = core.live.get_mut(child) {
            co.parent = Some(parent);
        }
        if let Some(co) = core.live.get_mut(parent) {
            co.reporter = Some(reporter as Arc<dyn Report>);
            if let Some(prev) = co.child.replace(child) {
                debug!("{}: child link {} replaced by {}", parent, prev, child);
            }
        }
        trace!("{}: created child {}", parent, child);
        Ok(child)
    }

    // ------------------------------------------------------------------
    // Suspension (only from inside the running coroutine)
    // ------------------------------------------------------------------

    /// Suspend the running coroutine for `ticks` scheduling passes.
    ///
    /// No-op when `ticks` is zero or when called outside a running coroutine.
    pub fn yield_ticks(&self, ticks: u32) {
        if self.park_ticks(ticks) {
            stack::suspend();
        }
    }

    /// Suspend the running coroutine until `duration` has elapsed, or until
    /// its child finishes, whichever comes first.
    ///
    /// No-op when `duration` is zero or when called outside a running coroutine.
    pub fn wait(&self, duration: Duration) {
        if self.park_until(duration) {
            stack::suspend();
        }
    }

    /// Mark the running coroutine suspended by ticks; true if it must switch out
    pub(crate) fn park_ticks(&self, ticks: u32) -> bool {
        if ticks == 0 {
            return false;
        }
        self.park(|co| co.yield_wait = co.yield_wait.saturating_add(ticks))
    }

    /// Mark the running coroutine suspended by deadline; true if it must switch out
    pub(crate) fn park_until(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return false;
        }
        // Only read the clock once the caller is known to be a coroutine
        self.park(|co| co.yield_to = Some(deadline_after(Instant::now(), duration)))
    }

    fn park(&self, set: impl FnOnce(&mut Coroutine)) -> bool {
        let mut core = self.core.borrow_mut();
        let Some(id) = core.running else {
            debug!("suspend ignored: no coroutine running");
            return false;
        };
        let Some(co) = core.live.get_mut(id) else {
            return false;
        };
        if !co.state.can_suspend() {
            debug!("suspend ignored: {} is {:?}", id, co.state);
            return false;
        }

        co.state = CoroutineState::Suspended;
        set(co);
        core.running = None;
        true
    }

    /// Force a suspended coroutine to be runnable on the next pass,
    /// regardless of its pending ticks or deadline.
    ///
    /// A woken parent does not get a timeout recorded.
    pub fn wake(&self, id: CoroutineId) -> bool {
        let mut core = self.core.borrow_mut();
        match core.live.get_mut(id) {
            Some(co) if co.state == CoroutineState::Suspended => {
                co.wake();
                trace!("woke {}", id);
                true
            }
            Some(co) => {
                debug!("wake ignored: {} is {:?}", id, co.state);
                false
            }
            None => {
                debug!("wake ignored: {} is not live", id);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run one scheduling decision.
    ///
    /// Reclaims last pass's finished coroutines, inspects every live
    /// coroutine once, and switches into the first runnable one in creation
    /// order. Returns the id that ran, or `None` if nothing was runnable.
    ///
    /// Called from inside a running coroutine it returns that coroutine
    /// without doing anything else.
    pub fn pick_and_run(self: &Rc<Self>) -> Option<CoroutineId> {
        if let Some(id) = self.core.borrow().running {
            return Some(id);
        }

        let _enter = context::enter(self);
        self.reclaim();
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        let id = self.pick(Instant::now())?;
        let mut context = self.dispatch(id)?;

        self.stats.switches.fetch_add(1, Ordering::Relaxed);
        let switch = context.resume();

        match switch {
            Switch::Suspended => self.park_context(id, context),
            Switch::Finished => self.retire(id, context, Outcome::Done),
            Switch::Panicked(payload) => {
                warn!("{} panicked: {}", id, stack::panic_message(payload.as_ref()));
                self.stats.panics.fetch_add(1, Ordering::Relaxed);
                self.retire(id, context, Outcome::Panicked);
            }
        }
        Some(id)
    }

    /// Drop everything retired on the previous pass.
    fn reclaim(&self) {
        // Dropping a parked context unwinds its body, which may call back
        // into the scheduler; release the borrow first.
        let retired = std::mem::take(&mut self.core.borrow_mut().to_free);
        if !retired.is_empty() {
            trace!("reclaiming {} coroutine(s)", retired.len());
        }
        drop(retired);
    }

    /// First runnable coroutine; every live coroutine is inspected once.
    fn pick(&self, now: Instant) -> Option<CoroutineId> {
        let mut core = self.core.borrow_mut();
        let live = &mut core.live;
        let mut picked = None;

        for i in 0..live.len() {
            let id = live.ids()[i];
            let Some(co) = live.get_mut(id) else {
                continue;
            };
            if co.wait(now) > 0 {
                continue;
            }
            if picked.is_none() {
                picked = Some(id);
            }
        }
        picked
    }

    /// Move `id` into the running slot and take its context out of the table.
    fn dispatch(&self, id: CoroutineId) -> Option<StackContext> {
        let mut core = self.core.borrow_mut();

        let orphan = core.live.get_mut(id)?.yield_over();
        if let Some(orphan) = orphan {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            if let Some(mut child) = core.live.remove(orphan) {
                debug!("{}: reaping orphaned child {}", id, orphan);
                child.state = CoroutineState::Finished;
                child.parent = None;
                core.to_free.push(child);
                self.stats.orphans_reaped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let co = core.live.get_mut(id)?;
        if !co.state.can_dispatch() {
            warn!("{} picked while {:?}", id, co.state);
            return None;
        }
        let Some(context) = co.context.take() else {
            warn!("{} has no context to resume", id);
            return None;
        };
        co.state = CoroutineState::Running;
        core.running = Some(id);
        Some(context)
    }

    /// The coroutine switched out by suspending; put its context back.
    fn park_context(&self, id: CoroutineId, context: StackContext) {
        let mut core = self.core.borrow_mut();
        if core.running == Some(id) {
            // Switched out without going through yield/wait bookkeeping
            core.running = None;
        }
        match core.live.get_mut(id) {
            Some(co) => {
                if co.is_running() {
                    co.state = CoroutineState::Suspended;
                }
                co.context = Some(context);
            }
            None => drop_later(&mut core, id, context),
        }
    }

    /// The body returned: remove from the live set, then notify the parent.
    fn retire(&self, id: CoroutineId, context: StackContext, outcome: Outcome) {
        let mut core = self.core.borrow_mut();
        if core.running == Some(id) {
            core.running = None;
        }

        let Some(mut co) = core.live.remove(id) else {
            drop_later(&mut core, id, context);
            return;
        };
        co.state = CoroutineState::Finished;
        co.context = Some(context);
        let parent = co.parent.take();
        core.to_free.push(co);
        self.stats.finished.fetch_add(1, Ordering::Relaxed);
        trace!("{} finished ({:?})", id, outcome);

        if let Some(parent) = parent {
            match core.live.get_mut(parent) {
                Some(p) if p.child == Some(id) => p.child_finished(outcome),
                Some(_) => debug!("{}: parent {} moved on to another child", id, parent),
                None => debug!("{}: parent {} is gone", id, parent),
            }
        }
    }

    // ------------------------------------------------------------------
    // Loop
    // ------------------------------------------------------------------

    /// Poll every registered selectable once, in registration order
    pub fn poll_selectors(&self) {
        let objects = self.selectors.borrow_mut().snapshot();
        for object in objects {
            object.poll(Duration::ZERO);
        }
    }

    /// Run the scheduler loop on the calling thread until stopped.
    pub fn run_forever(self: &Rc<Self>) {
        let _enter = context::enter(self);
        info!("scheduler loop started");

        while !self.stop.is_stopped() {
            self.poll_selectors();
            self.pick_and_run();
            if self.done() {
                std::thread::sleep(self.config.idle_sleep);
            }
        }

        info!(
            "scheduler loop stopped ({} coroutine(s) still live)",
            self.len()
        );
    }

    /// Stop the loop at the top of its next pass
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    // ------------------------------------------------------------------
    // Selectors
    // ------------------------------------------------------------------

    /// Register `object` under `key`. Duplicate keys are logged and ignored.
    pub fn register_selector(&self, key: SelectorKey, object: &Rc<dyn Selectable>) -> bool {
        self.selectors.borrow_mut().register(key, object)
    }

    /// Register `object` keyed by its own address
    pub fn register_object(&self, object: &Rc<dyn Selectable>) -> bool {
        self.register_selector(SelectorKey::of(object), object)
    }

    /// Remove the registration for `key`. Absent keys are logged and ignored.
    pub fn unregister_selector(&self, key: SelectorKey) -> bool {
        self.selectors.borrow_mut().unregister(key)
    }

    /// Remove the registration of `object` made through [`register_object`](Self::register_object)
    pub fn unregister_object(&self, object: &Rc<dyn Selectable>) -> bool {
        self.unregister_selector(SelectorKey::of(object))
    }

    /// Number of registered selectables
    pub fn selector_count(&self) -> usize {
        self.selectors.borrow().len()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// True iff no coroutine is live
    pub fn done(&self) -> bool {
        self.core.borrow().live.is_empty()
    }

    /// Number of live coroutines
    pub fn len(&self) -> usize {
        self.core.borrow().live.len()
    }

    /// The running coroutine, if called from inside one
    pub fn current(&self) -> Option<CoroutineId> {
        self.core.borrow().running
    }

    /// Reporter attached to the running coroutine
    pub fn current_reporter(&self) -> Option<Arc<dyn Report>> {
        let core = self.core.borrow();
        let id = core.running?;
        core.live.get(id)?.reporter.clone()
    }

    /// State of a live coroutine
    pub fn state(&self, id: CoroutineId) -> Option<CoroutineState> {
        self.core.borrow().live.get(id).map(|co| co.state)
    }

    /// Whether `id` is still in the live set
    pub fn contains(&self, id: CoroutineId) -> bool {
        self.core.borrow().live.contains(id)
    }

    /// Parent and child links of a live coroutine
    pub fn links(&self, id: CoroutineId) -> Option<(Option<CoroutineId>, Option<CoroutineId>)> {
        self.core.borrow().live.get(id).map(|co| (co.parent, co.child))
    }

    /// Number of live coroutines in the Running state (never more than one)
    pub fn running_count(&self) -> usize {
        let core = self.core.borrow();
        core.live
            .ids()
            .iter()
            .filter_map(|&id| core.live.get(id))
            .filter(|co| co.is_running())
            .count()
    }

    /// Number of coroutines awaiting reclamation
    pub fn pending_free(&self) -> usize {
        self.core.borrow().to_free.len()
    }
}

/// Keep a context whose record is already gone until the next pass.
fn drop_later(core: &mut Core, id: CoroutineId, context: StackContext) {
    let mut co = Coroutine::new(id, context);
    co.state = CoroutineState::Finished;
    core.to_free.push(co);
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        let abandoned = core.live.drain();
        if !abandoned.is_empty() {
            debug!("dropping scheduler with {} live coroutine(s)", abandoned.len());
        }
        // Parked bodies unwind here, on the dropping thread
        drop(abandoned);
        core.to_free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn run_until_done(s: &Rc<Scheduler>) {
        let mut guard = 0;
        while !s.done() {
            s.pick_and_run();
            guard += 1;
            assert!(guard < 10_000, "scheduler did not drain");
        }
    }

    #[test]
    fn test_builder() {
        let s = Scheduler::builder()
            .stack_size(128 * 1024)
            .idle_sleep(Duration::from_millis(1))
            .max_coroutines(8)
            .build();

        assert_eq!(s.config().stack_size, 128 * 1024);
        assert_eq!(s.config().idle_sleep, Duration::from_millis(1));
        assert_eq!(s.config().max_coroutines, 8);
    }

    #[test]
    fn test_create_and_run() {
        let s = Scheduler::new();
        let hits = Arc::new(AtomicU32::new(0));
        let h = hits.clone();

        let id = s
            .create(
                move |n: u32| {
                    h.fetch_add(n, Ordering::Relaxed);
                },
                5,
            )
            .unwrap();

        assert_eq!(s.state(id), Some(CoroutineState::Ready));
        assert!(!s.done());

        assert_eq!(s.pick_and_run(), Some(id));
        assert_eq!(hits.load(Ordering::Relaxed), 5);
        assert!(s.done());
        assert!(!s.contains(id));
    }

    #[test]
    fn test_capacity_limit() {
        let s = Scheduler::builder().max_coroutines(1).build();
        s.create(|_: ()| {}, ()).unwrap();
        assert!(matches!(
            s.create(|_: ()| {}, ()),
            Err(Error::CapacityExceeded(1))
        ));
    }

    #[test]
    fn test_create_child_outside_coroutine() {
        let s = Scheduler::new();
        let r = Reporter::empty();
        assert!(matches!(
            s.create_child(|_| {}, r),
            Err(Error::NotInCoroutine)
        ));
    }

    #[test]
    fn test_failed_create_child_keeps_reporter() {
        let s = Scheduler::builder().max_coroutines(2).build();
        let first = Reporter::new(1u32);
        let second = Reporter::new(2u32);
        let checks = Arc::new(AtomicU32::new(0));
        let (r1, r2, f) = (first.clone(), second.clone(), checks.clone());

        s.create(
            move |_: ()| {
                crate::spawn_child(|_| crate::yield_now(2), r1).unwrap();
                if let Err(Error::CapacityExceeded(2)) = crate::spawn_child(|_| {}, r2) {
                    f.fetch_add(1, Ordering::Relaxed);
                }
                if crate::wait_child(Duration::from_secs(5)) == Some(Outcome::Done) {
                    f.fetch_add(1, Ordering::Relaxed);
                }
            },
            (),
        )
        .unwrap();
        run_until_done(&s);

        assert_eq!(checks.load(Ordering::Relaxed), 2);
        assert_eq!(first.outcome(), Some(Outcome::Done));
        assert_eq!(second.outcome(), None);
        assert_eq!(s.stats().panics.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_suspend_outside_coroutine_is_noop() {
        let s = Scheduler::new();
        s.yield_ticks(3);
        s.wait(Duration::from_millis(5));
        assert!(!s.park_ticks(1));
        assert!(!s.park_until(Duration::from_millis(1)));
    }

    #[test]
    fn test_max_wait_outside_coroutine_is_noop() {
        let s = Scheduler::new();
        s.wait(Duration::MAX);
        assert!(!s.park_until(Duration::MAX));
        assert!(s.done());
    }

    #[test]
    fn test_nothing_runnable() {
        let s = Scheduler::new();
        assert_eq!(s.pick_and_run(), None);
    }

    #[test]
    fn test_deferred_free() {
        let s = Scheduler::new();
        s.create(|_: ()| {}, ()).unwrap();

        s.pick_and_run();
        assert!(s.done());
        // Retired, not yet reclaimed
        assert_eq!(s.pending_free(), 1);

        assert_eq!(s.pick_and_run(), None);
        assert_eq!(s.pending_free(), 0);
    }

    #[test]
    fn test_panicking_body_is_retired() {
        let s = Scheduler::new();
        s.create(|_: ()| panic!("body failed"), ()).unwrap();

        s.pick_and_run();
        assert!(s.done());
        assert_eq!(s.stats().panics.load(Ordering::Relaxed), 1);
        assert_eq!(s.stats().finished.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_wake_stale_id() {
        let s = Scheduler::new();
        let id = s.create(|_: ()| {}, ()).unwrap();
        run_until_done(&s);
        assert!(!s.wake(id));
    }

    #[test]
    fn test_wake_ready_is_ignored() {
        let s = Scheduler::new();
        let id = s.create(|_: ()| {}, ()).unwrap();
        assert!(!s.wake(id));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let s = Scheduler::new();
        assert!(!s.is_stopped());
        s.stop();
        s.stop();
        assert!(s.is_stopped());
        assert!(s.stop_handle().is_stopped());
    }

    #[test]
    fn test_run_forever_exits_when_stopped() {
        let s = Scheduler::new();
        s.stop();
        s.run_forever();
    }

    #[test]
    fn test_drop_with_parked_coroutines() {
        struct Flag(Arc<AtomicU32>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let dropped = Arc::new(AtomicU32::new(0));
        let d = dropped.clone();
        let s = Scheduler::new();
        s.create(
            move |_: ()| {
                let _flag = Flag(d);
                crate::yield_now(1_000);
            },
            (),
        )
        .unwrap();

        s.pick_and_run();
        assert_eq!(s.len(), 1);
        drop(s);
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
    }

    static_assertions::assert_not_impl_any!(Scheduler: Send, Sync);
    static_assertions::assert_impl_all!(StopHandle: Send, Sync);
}
