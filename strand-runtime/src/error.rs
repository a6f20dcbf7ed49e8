//! Error types for the Strand runtime

use thiserror::Error;

/// Alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;

/// Strand runtime errors
#[derive(Error, Debug)]
pub enum Error {
    /// Operation requires a running coroutine on this thread
    #[error("no coroutine is running on this thread")]
    NotInCoroutine,

    /// No scheduler is installed on this thread
    #[error("no scheduler is installed on this thread")]
    NoScheduler,

    /// Stack or execution context could not be created
    #[error("stack allocation failed: {0}")]
    StackAlloc(String),

    /// Live coroutine limit reached
    #[error("coroutine capacity exceeded: {0} live")]
    CapacityExceeded(usize),

    /// Timer interval must be non-zero
    #[error("timer interval must be non-zero")]
    InvalidInterval,

    /// Timer already armed, or engine already started
    #[error("already running")]
    AlreadyRunning,

    /// Timer not armed
    #[error("not running")]
    NotRunning,

    /// Engine threads were not started
    #[error("engine not started")]
    NotStarted,

    /// Invalid scheduler thread index
    #[error("invalid scheduler thread index: {0}")]
    InvalidThread(usize),

    /// Scheduler thread inbox is closed
    #[error("scheduler thread inbox disconnected")]
    Disconnected,

    /// Failed to spawn an OS thread
    #[error("thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),
}
