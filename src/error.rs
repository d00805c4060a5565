//! # Errors and Invariant Checks
//!
//! Kernel operations fail in exactly two ways: a recoverable rejection
//! returned to the caller ([`KernelError`]), or a broken kernel invariant
//! ([`InvariantViolation`]). The latter is only detected when the
//! `assertions` feature is enabled and is then reported through
//! [`Port::assertion_failed`](crate::port::Port::assertion_failed).

use core::fmt;

/// Recoverable failures returned by kernel calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No stack buffer was supplied (or it was empty).
    MissingStackBuffer,
    /// No task control block buffer was supplied.
    MissingTaskBuffer,
    /// The stack buffer has no room for the port's initial frame.
    StackTooSmall,
    /// Every slot of the task table is in use.
    TaskTableFull,
}

impl KernelError {
    /// Whether the task creation was rejected because a required static
    /// buffer was missing or unusable.
    pub fn is_creation_rejected(self) -> bool {
        matches!(
            self,
            Self::MissingStackBuffer | Self::MissingTaskBuffer | Self::StackTooSmall
        )
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStackBuffer => f.write_str("task creation rejected: no stack buffer"),
            Self::MissingTaskBuffer => f.write_str("task creation rejected: no TCB buffer"),
            Self::StackTooSmall => {
                f.write_str("task creation rejected: stack too small for the initial frame")
            }
            Self::TaskTableFull => f.write_str("task table is full"),
        }
    }
}

/// A broken kernel invariant. Production builds don't check for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// `exit_critical` was called with a nesting depth of zero.
    CriticalNestingUnderflow,
    /// The outermost task-level critical section was entered from an
    /// interrupt handler.
    CriticalEnteredFromInterrupt,
    /// A list node was removed while not linked into any list.
    DetachedNodeRemoved,
    /// The tick counter wrapped while tasks were still waiting in the
    /// active delay list.
    ActiveDelayListNotEmptyOnWrap,
    /// A context switch was requested with every ready list empty.
    NoReadyTask,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::CriticalNestingUnderflow => "critical section exited more often than entered",
            Self::CriticalEnteredFromInterrupt => "task-level critical section entered from an ISR",
            Self::DetachedNodeRemoved => "removed a list node that is not in a list",
            Self::ActiveDelayListNotEmptyOnWrap => "tick wrapped with tasks left in the delay list",
            Self::NoReadyTask => "no ready task to switch to",
        };
        f.write_str(msg)
    }
}

/// Check a kernel invariant. Compiled out unless the `assertions` feature
/// is enabled, in which case a failed check is handed to the port's
/// assertion hook.
macro_rules! kernel_assert {
    ($port:ty, $cond:expr, $violation:expr) => {
        if cfg!(feature = "assertions") && !($cond) {
            <$port as $crate::port::Port>::assertion_failed($violation);
        }
    };
}

pub(crate) use kernel_assert;
