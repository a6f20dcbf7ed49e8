//! Parent/child timeout stress test
//!
//! Parents repeatedly spawn a child and wait for it with a deadline. A
//! configurable share of the children overrun the deadline, so both the
//! completion path and the timeout/reap path get exercised. The run fails
//! if any outcome disagrees with what the child was told to do.

use clap::Parser;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strand_runtime::{sleep, spawn_child, wait_child, yield_now, Outcome, Reporter, Scheduler};

/// Parent/child timeout stress test
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of parent coroutines
    #[arg(short, long, default_value_t = 32)]
    parents: u32,

    /// Children spawned by each parent, one after another
    #[arg(short, long, default_value_t = 20)]
    children: u32,

    /// Parent wait deadline (milliseconds)
    #[arg(short, long, default_value_t = 20)]
    deadline_ms: u64,

    /// Every Nth child overruns the deadline
    #[arg(short, long, default_value_t = 4)]
    overrun_every: u32,
}

#[derive(Default)]
struct Tally {
    done: AtomicU64,
    timeout: AtomicU64,
    mismatched: AtomicU64,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter("info").init();

    tracing::info!("Timeout stress test");
    tracing::info!("  Parents: {}", args.parents);
    tracing::info!("  Children/parent: {}", args.children);
    tracing::info!("  Deadline: {}ms", args.deadline_ms);
    tracing::info!("  Overrun every: {}", args.overrun_every);

    let scheduler = Scheduler::new();
    let tally = Arc::new(Tally::default());
    let deadline = Duration::from_millis(args.deadline_ms);

    for parent in 0..args.parents {
        let tally = tally.clone();
        let children = args.children;
        let overrun_every = args.overrun_every.max(1);

        scheduler
            .create(
                move |parent: u32| {
                    for child in 0..children {
                        let overrun = (parent + child) % overrun_every == 0;
                        let reporter = Reporter::new(overrun);

                        spawn_child(
                            move |overrun| {
                                if *overrun {
                                    sleep(deadline * 10);
                                } else {
                                    yield_now(1);
                                }
                            },
                            reporter,
                        )
                        .unwrap();

                        match (wait_child(deadline), overrun) {
                            (Some(Outcome::Done), false) => {
                                tally.done.fetch_add(1, Ordering::Relaxed);
                            }
                            (Some(Outcome::Timeout), true) => {
                                tally.timeout.fetch_add(1, Ordering::Relaxed);
                            }
                            (outcome, overrun) => {
                                tracing::warn!(
                                    "parent {} child {}: got {:?}, overrun {}",
                                    parent,
                                    child,
                                    outcome,
                                    overrun
                                );
                                tally.mismatched.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                },
                parent,
            )
            .unwrap();
    }

    let start = Instant::now();
    while !scheduler.done() {
        scheduler.poll_selectors();
        scheduler.pick_and_run();
    }
    let elapsed = start.elapsed();

    let stats = scheduler.stats();
    tracing::info!("\n=== Results ===");
    tracing::info!("Elapsed: {:?}", elapsed);
    tracing::info!("Done: {}", tally.done.load(Ordering::Relaxed));
    tracing::info!("Timed out: {}", tally.timeout.load(Ordering::Relaxed));
    tracing::info!("Orphans reaped: {}", stats.orphans_reaped.load(Ordering::Relaxed));
    tracing::info!("Passes: {}", stats.passes.load(Ordering::Relaxed));

    let mismatched = tally.mismatched.load(Ordering::Relaxed);
    if mismatched > 0 {
        tracing::warn!("{} outcome(s) did not match the child's behavior", mismatched);
        std::process::exit(1);
    }
}
