//! # Critical Sections
//!
//! Interrupt masking is the kernel's only mutual-exclusion mechanism: on a
//! single core, shared scheduler state only needs protecting from the tick
//! and context-switch handlers.
//!
//! Two flavours exist:
//! - [`CriticalNesting`] for task context. It counts nesting depth and
//!   only masks on the outermost entry and unmasks on the outermost exit.
//! - [`from_isr`] for any context. It saves the current mask, raises it,
//!   and restores exactly what was there before.

use core::marker::PhantomData;

use crate::error::{kernel_assert, InvariantViolation};
use crate::port::Port;

/// Nesting counter for task-level critical sections.
pub struct CriticalNesting<P> {
    depth: usize,
    _port: PhantomData<P>,
}

impl<P: Port> CriticalNesting<P> {
    pub const fn new() -> Self {
        Self {
            depth: 0,
            _port: PhantomData,
        }
    }

    /// Enter a critical section. Interrupts are masked on the 0 → 1
    /// transition only.
    pub fn enter(&mut self) {
        if self.depth == 0 {
            P::disable_interrupts();
            kernel_assert!(
                P,
                !P::in_interrupt(),
                InvariantViolation::CriticalEnteredFromInterrupt
            );
        }
        self.depth += 1;
    }

    /// Leave a critical section. Interrupts are unmasked on the 1 → 0
    /// transition only. Unbalanced exits are ignored.
    pub fn exit(&mut self) {
        kernel_assert!(P, self.depth > 0, InvariantViolation::CriticalNestingUnderflow);
        let Some(depth) = self.depth.checked_sub(1) else {
            return;
        };
        self.depth = depth;
        if depth == 0 {
            P::enable_interrupts();
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<P: Port> Default for CriticalNesting<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a closure with kernel interrupts masked, from any context.
///
/// The previous mask is restored on exit, so calls nest naturally and
/// are safe inside interrupt handlers.
#[inline]
pub fn from_isr<P, F, R>(f: F) -> R
where
    P: Port,
    F: FnOnce() -> R,
{
    let mask = P::raise_mask_from_isr();
    let result = f();
    P::restore_mask_from_isr(mask);
    result
}
