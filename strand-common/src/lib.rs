// SPDX-License-Identifier: GPL-2.0-only
// Copyright (C) 2024 Ankit Kumar Pandey <ankitkpandey1@gmail.com>

//! # strand-common
//!
//! Shared vocabulary for the Strand coroutine runtime.
//!
//! The enums here are `#[repr(u8)]` so that they can be stored in atomics
//! (the result reporter is written from one coroutine and read from another)
//! and round-tripped through `TryFrom<u8>`.
//!
//! ## Architectural Guardrails (Non-Goals)
//!
//! 1. **Preemption** - every suspension point is explicit and cooperative
//! 2. **Work stealing** - a coroutine lives and dies on the scheduler that created it
//! 3. **I/O integration** - event sources plug in through the selector contract only

#![no_std]

// ============================================================================
// Coroutine Lifecycle State Machine
// ============================================================================

/// Coroutine lifecycle state
///
/// State transitions:
/// ```text
/// READY → RUNNING → SUSPENDED → RUNNING → ... → FINISHED
///            ↑          ↓
///            └──────────┘ (resume)
/// ```
///
/// Rules:
/// - Only the scheduler moves a coroutine into RUNNING
/// - Only the running coroutine moves itself into SUSPENDED
/// - FINISHED is terminal; the stack is never touched again
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoroutineState {
    /// Created, never dispatched
    #[default]
    Ready = 0,

    /// Currently executing on its own stack
    Running = 1,

    /// Parked by yield-by-ticks or wait-by-deadline
    Suspended = 2,

    /// Body returned (or panicked); awaiting reclamation
    Finished = 3,
}

impl CoroutineState {
    /// Check if the scheduler may switch into a coroutine in this state
    #[inline]
    pub fn can_dispatch(self) -> bool {
        matches!(self, CoroutineState::Ready | CoroutineState::Suspended)
    }

    /// Check if the coroutine is allowed to suspend itself
    #[inline]
    pub fn can_suspend(self) -> bool {
        matches!(self, CoroutineState::Running)
    }
}

impl TryFrom<u8> for CoroutineState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CoroutineState::Ready),
            1 => Ok(CoroutineState::Running),
            2 => Ok(CoroutineState::Suspended),
            3 => Ok(CoroutineState::Finished),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Child Outcome
// ============================================================================

/// Outcome recorded in a result reporter
///
/// `0` is reserved for "unset" so an `AtomicU8` can hold `Option<Outcome>`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child body returned before the parent's deadline
    Done = 1,

    /// The parent's deadline elapsed first; the child was reaped
    Timeout = 2,

    /// The child body panicked; it was retired like a normal return
    Panicked = 3,
}

impl Outcome {
    /// Raw value meaning "no outcome recorded yet"
    pub const UNSET: u8 = 0;

    /// Decode a raw reporter slot
    #[inline]
    pub fn from_raw(value: u8) -> Option<Self> {
        Self::try_from(value).ok()
    }

    /// Whether the child ran to completion (normally or not)
    #[inline]
    pub fn is_finished(self) -> bool {
        matches!(self, Outcome::Done | Outcome::Panicked)
    }
}

impl TryFrom<u8> for Outcome {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Outcome::Done),
            2 => Ok(Outcome::Timeout),
            3 => Ok(Outcome::Panicked),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Configuration constants
// ============================================================================

/// Configuration constants
pub mod config {
    /// Default coroutine stack size in bytes (64KB)
    pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

    /// Smallest stack a coroutine may be given (16KB)
    pub const MIN_STACK_SIZE: usize = 16 * 1024;

    /// Idle sleep of the run loop when no coroutine is live (10ms)
    pub const IDLE_SLEEP_MS: u64 = 10;

    /// Default cap on live coroutines per scheduler
    pub const DEFAULT_MAX_COROUTINES: usize = 65_536;

    /// Worker thread name prefix used by the engine
    pub const THREAD_NAME_PREFIX: &str = "strand-sched";
}

// ============================================================================
// Tests
// ============================================================================
