//! # Port Boundary
//!
//! Everything the kernel needs from the processor, expressed as a trait
//! with associated functions. A port is a zero-sized type; there is one
//! per target architecture (see [`crate::arch`]).
//!
//! The kernel never touches hardware directly. Stack-frame layout,
//! interrupt masking and the deferred context switch all live behind
//! this trait.

use crate::error::InvariantViolation;
use crate::task::{StackWord, TaskEntry};

/// Processor-specific services required by the scheduler.
pub trait Port: 'static {
    /// Saved interrupt mask returned by [`Port::raise_mask_from_isr`].
    type InterruptMask: Copy;

    /// Words the initial frame occupies below the top of stack. Stacks
    /// without that much room are rejected at task creation.
    const FRAME_WORDS: usize;

    /// Build the initial saved-register image in the [`Port::FRAME_WORDS`]
    /// words below `top_of_stack` so that
    /// restoring it starts executing `entry(args)`. Returns the saved
    /// stack pointer to store in the task's control block.
    ///
    /// # Safety
    /// `top_of_stack` must point into a writable stack buffer with at least
    /// `FRAME_WORDS` words below it.
    unsafe fn init_stack_frame(
        top_of_stack: *mut StackWord,
        entry: TaskEntry,
        args: *mut (),
    ) -> *mut StackWord;

    /// Hand the CPU to the currently selected task. Never returns.
    ///
    /// # Safety
    /// Must be called exactly once, from thread mode, after at least one
    /// task has been created.
    unsafe fn start_first_task() -> !;

    /// Request a context switch at the next safe point. Non-blocking.
    fn request_switch();

    /// Mask kernel-level interrupts. Task context only; not nestable on
    /// its own (the kernel keeps the nesting count).
    fn disable_interrupts();

    /// Undo [`Port::disable_interrupts`].
    fn enable_interrupts();

    /// Mask kernel-level interrupts from any context and return the
    /// previous mask.
    fn raise_mask_from_isr() -> Self::InterruptMask;

    /// Restore a mask saved by [`Port::raise_mask_from_isr`].
    fn restore_mask_from_isr(mask: Self::InterruptMask);

    /// Whether the caller runs in an interrupt handler.
    fn in_interrupt() -> bool {
        false
    }

    /// Invoked on a broken kernel invariant when the `assertions` feature
    /// is enabled.
    fn assertion_failed(violation: InvariantViolation) {
        log::error!("kernel invariant violated: {violation}");
        panic!("kernel invariant violated: {violation}");
    }

    /// Index of the most significant set bit of `mask`, or `None` if no bit
    /// is set. Ports with a count-leading-zeros instruction override this.
    fn highest_set_bit(mask: u32) -> Option<usize> {
        (0..u32::BITS as usize).rev().find(|&bit| mask & (1 << bit) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    struct Portable;

    impl Port for Portable {
        type InterruptMask = ();
        const FRAME_WORDS: usize = 0;

        unsafe fn init_stack_frame(
            top_of_stack: *mut StackWord,
            _: TaskEntry,
            _: *mut (),
        ) -> *mut StackWord {
            top_of_stack
        }
        unsafe fn start_first_task() -> ! {
            unreachable!()
        }
        fn request_switch() {}
        fn disable_interrupts() {}
        fn enable_interrupts() {}
        fn raise_mask_from_isr() {}
        fn restore_mask_from_isr(_: ()) {}
    }

    fn clz_highest_set_bit(mask: u32) -> Option<usize> {
        mask.checked_ilog2().map(|bit| bit as usize)
    }

    #[test]
    fn highest_set_bit_edges() {
        assert_eq!(Portable::highest_set_bit(0), None);
        assert_eq!(Portable::highest_set_bit(1), Some(0));
        assert_eq!(Portable::highest_set_bit(0b1_0110), Some(4));
        assert_eq!(Portable::highest_set_bit(u32::MAX), Some(31));
    }

    #[quickcheck]
    fn linear_scan_matches_leading_zeros(mask: u32) {
        assert_eq!(Portable::highest_set_bit(mask), clz_highest_set_bit(mask));
    }
}
