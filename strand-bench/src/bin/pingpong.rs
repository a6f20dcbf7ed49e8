//! Ping-pong switch benchmark
//!
//! Every scheduler thread runs a set of coroutines that do nothing but
//! yield one tick at a time, so almost all time is spent in the scheduling
//! pass and the context switch.

use clap::Parser;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strand_runtime::{yield_now, Engine};

/// Context switch throughput benchmark
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of scheduler threads
    #[arg(short = 't', long, default_value_t = 2)]
    threads: usize,

    /// Coroutines per thread
    #[arg(short, long, default_value_t = 64)]
    coroutines: usize,

    /// Yields per coroutine
    #[arg(short, long, default_value_t = 10_000)]
    rounds: u64,

    /// Coroutine stack size (bytes)
    #[arg(long, default_value_t = strand_common::config::DEFAULT_STACK_SIZE)]
    stack_size: usize,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter("info").init();

    tracing::info!("Ping-pong benchmark");
    tracing::info!("  Threads: {}", args.threads);
    tracing::info!("  Coroutines/thread: {}", args.coroutines);
    tracing::info!("  Rounds: {}", args.rounds);
    tracing::info!("  Stack size: {} bytes", args.stack_size);

    let ready = Arc::new(Mutex::new(Vec::new()));
    let ready_clone = ready.clone();

    let mut engine = Engine::builder()
        .num_threads(args.threads)
        .stack_size(args.stack_size)
        .idle_sleep(Duration::from_millis(1))
        .on_thread_ready(move |index, id| {
            ready_clone.lock().push((index, id));
        })
        .build();

    engine.start().unwrap();
    tracing::info!("Scheduler threads ready: {}", ready.lock().len());

    let yields = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));
    let total = (args.threads * args.coroutines) as u64;
    let start = Instant::now();

    for index in 0..args.threads {
        for _ in 0..args.coroutines {
            let yields = yields.clone();
            let finished = finished.clone();
            let rounds = args.rounds;
            engine
                .spawn_on(index, move || {
                    for _ in 0..rounds {
                        yield_now(1);
                        yields.fetch_add(1, Ordering::Relaxed);
                    }
                    finished.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
        }
    }

    while finished.load(Ordering::Relaxed) < total {
        thread::sleep(Duration::from_millis(10));
    }
    let elapsed = start.elapsed();

    let mut switches = 0;
    for index in 0..args.threads {
        if let Some(stats) = engine.stats(index) {
            let n = stats.switches.load(Ordering::Relaxed);
            tracing::info!(
                "thread {} (tid {}): {} switches, {} passes",
                index,
                engine.thread_tids()[index],
                n,
                stats.passes.load(Ordering::Relaxed)
            );
            switches += n;
        }
    }
    engine.stop();

    let yields = yields.load(Ordering::Relaxed);
    tracing::info!("\n=== Results ===");
    tracing::info!("Elapsed: {:?}", elapsed);
    tracing::info!("Yields: {}", yields);
    tracing::info!("Switches: {}", switches);
    tracing::info!(
        "Switches/second: {:.0}",
        switches as f64 / elapsed.as_secs_f64()
    );
    if switches > 0 {
        tracing::info!(
            "Mean time per switch: {:.0} ns",
            elapsed.as_nanos() as f64 * args.threads as f64 / switches as f64
        );
    }
}
