//! # Strand Runtime
//!
//! A single-thread cooperative scheduler for stackful coroutines.
//!
//! Each coroutine runs on its own fixed-size stack and gives up the
//! processor only at explicit points: yielding for a number of scheduling
//! passes, sleeping until a deadline, or waiting for a child coroutine.
//! Nothing is preempted.
//!
//! ## Key Components
//!
//! - **Scheduler**: owns the live coroutines of one thread and decides, once
//!   per pass, which one runs next (first runnable in creation order)
//! - **Reporter**: the outcome channel between a parent and the child it waits on
//! - **Selectable**: non-coroutine event sources polled once per pass
//! - **Engine**: one scheduler per OS thread, fed through per-thread inboxes
//! - **Timer**: periodic or one-shot callbacks started as coroutines
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strand_runtime::{Scheduler, sleep, yield_now};
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//!
//! scheduler
//!     .create(
//!         |n: u32| {
//!             for _ in 0..n {
//!                 // Let everyone else run for two passes
//!                 yield_now(2);
//!             }
//!         },
//!         10,
//!     )
//!     .unwrap();
//!
//! scheduler
//!     .create(
//!         |_: ()| {
//!             sleep(Duration::from_millis(50));
//!         },
//!         (),
//!     )
//!     .unwrap();
//!
//! while !scheduler.done() {
//!     scheduler.pick_and_run();
//! }
//! ```
//!
//! ## Waiting on a child
//!
//! ```rust,no_run
//! use strand_runtime::{spawn, spawn_child, wait_child, Outcome, Reporter};
//! use std::time::Duration;
//!
//! spawn(|| {
//!     let reporter = Reporter::new(String::from("job"));
//!     spawn_child(|job| println!("working on {job}"), reporter.clone()).unwrap();
//!
//!     match wait_child(Duration::from_secs(1)) {
//!         Some(Outcome::Done) => println!("child finished"),
//!         Some(Outcome::Timeout) => println!("gave up on child"),
//!         _ => {}
//!     }
//! })
//! .unwrap();
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod reporter;
pub mod scheduler;
pub mod selector;
pub mod timer;

mod coroutine;
mod stack;
mod table;

pub use context::{
    current, current_id, current_reporter, sleep, spawn, spawn_child, spawn_with, try_current,
    wait_child, wake, yield_now,
};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use reporter::{Report, Reporter};
pub use scheduler::{Builder, Scheduler, SchedulerConfig, SchedulerStats, StopHandle};
pub use selector::{Selectable, SelectorKey};
pub use table::CoroutineId;
pub use timer::Timer;

/// Re-export common types
pub use strand_common::{CoroutineState, Outcome};
