//! # Simulated Port
//!
//! A hosted stand-in for the processor. There is no real preemption: the
//! interrupt mask is a flag, a context-switch request is a counter, and
//! "interrupt context" is whatever runs inside [`SimPort::run_as_interrupt`].
//! Callers play the role of the hardware by invoking the scheduler's tick
//! and selection entry points themselves.
//!
//! State is thread-local, so every test thread is its own single-core
//! machine.

use std::cell::Cell;
use std::thread_local;

use crate::port::Port;
use crate::task::{StackWord, TaskEntry};

/// Words written below the top of stack by [`SimPort::init_stack_frame`]:
/// entry point and argument.
pub const SIM_FRAME_WORDS: usize = 2;

thread_local! {
    static MACHINE: Machine = const { Machine::new() };
}

struct Machine {
    masked: Cell<bool>,
    /// Number of times the mask went from clear to set.
    mask_raises: Cell<usize>,
    pending_switches: Cell<usize>,
    in_interrupt: Cell<bool>,
}

impl Machine {
    const fn new() -> Self {
        Self {
            masked: Cell::new(false),
            mask_raises: Cell::new(0),
            pending_switches: Cell::new(0),
            in_interrupt: Cell::new(false),
        }
    }

    fn set_masked(&self, masked: bool) {
        if masked && !self.masked.get() {
            self.mask_raises.set(self.mask_raises.get() + 1);
        }
        self.masked.set(masked);
    }
}

/// The simulated processor.
#[derive(Debug, Clone, Copy)]
pub struct SimPort;

impl SimPort {
    /// Put this thread's machine back into its power-on state.
    pub fn reset() {
        MACHINE.with(|m| {
            m.masked.set(false);
            m.mask_raises.set(0);
            m.pending_switches.set(0);
            m.in_interrupt.set(false);
        });
    }

    pub fn interrupts_masked() -> bool {
        MACHINE.with(|m| m.masked.get())
    }

    /// How often the interrupt mask has been raised from the unmasked
    /// state since the last reset.
    pub fn mask_raises() -> usize {
        MACHINE.with(|m| m.mask_raises.get())
    }

    /// Context-switch requests not yet serviced.
    pub fn pending_switches() -> usize {
        MACHINE.with(|m| m.pending_switches.get())
    }

    /// Service all pending context-switch requests. Returns whether there
    /// were any.
    pub fn take_pending_switch() -> bool {
        MACHINE.with(|m| m.pending_switches.replace(0) > 0)
    }

    /// Run `f` as if it were an interrupt handler.
    pub fn run_as_interrupt<R>(f: impl FnOnce() -> R) -> R {
        let was = MACHINE.with(|m| m.in_interrupt.replace(true));
        let result = f();
        MACHINE.with(|m| m.in_interrupt.set(was));
        result
    }

    /// Decode a frame written by [`SimPort::init_stack_frame`] into the
    /// entry point address and argument.
    ///
    /// # Safety
    /// `sp` must be a stack pointer returned by `init_stack_frame`.
    pub unsafe fn read_frame(sp: *const StackWord) -> (usize, *mut ()) {
        unsafe { (*sp, *sp.add(1) as *mut ()) }
    }
}

impl Port for SimPort {
    type InterruptMask = bool;
    const FRAME_WORDS: usize = SIM_FRAME_WORDS;

    unsafe fn init_stack_frame(
        top_of_stack: *mut StackWord,
        entry: TaskEntry,
        args: *mut (),
    ) -> *mut StackWord {
        unsafe {
            let sp = top_of_stack.sub(SIM_FRAME_WORDS);
            sp.write(entry as usize);
            sp.add(1).write(args as usize);
            sp
        }
    }

    unsafe fn start_first_task() -> ! {
        panic!("the simulated port cannot dispatch tasks; drive the scheduler directly");
    }

    fn request_switch() {
        MACHINE.with(|m| m.pending_switches.set(m.pending_switches.get() + 1));
    }

    fn disable_interrupts() {
        MACHINE.with(|m| m.set_masked(true));
    }

    fn enable_interrupts() {
        MACHINE.with(|m| m.set_masked(false));
    }

    fn raise_mask_from_isr() -> bool {
        MACHINE.with(|m| {
            let previous = m.masked.get();
            m.set_masked(true);
            previous
        })
    }

    fn restore_mask_from_isr(mask: bool) {
        MACHINE.with(|m| m.masked.set(mask));
    }

    fn in_interrupt() -> bool {
        MACHINE.with(|m| m.in_interrupt.get())
    }
}
