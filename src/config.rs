//! # Tickos Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time; there is no dynamic allocation.

/// Number of priority levels. Valid priorities are `0..MAX_PRIORITIES`,
/// higher numbers are more urgent. The ready-queue occupancy tracker is a
/// single `u32`, so at most 32 levels are supported.
pub const MAX_PRIORITIES: usize = 5;

/// Maximum number of tasks, including the idle task. This bounds the
/// task table and the list-node arena.
pub const MAX_TASKS: usize = 8;

/// Size of the task name buffer in bytes, including the terminating NUL.
pub const MAX_TASK_NAME_LEN: usize = 16;

/// Stack depth of the idle task, in words.
pub const MINIMAL_STACK_SIZE: usize = 128;

/// Priority of the idle task. Always the lowest level.
pub const IDLE_PRIORITY: usize = 0;

/// SysTick frequency in Hz. One tick is the unit of every delay.
pub const TICK_HZ: u32 = 1000;

/// Core clock frequency in Hz (STM32F103 running from the 72 MHz PLL).
pub const SYSTEM_CLOCK_HZ: u32 = 72_000_000;

/// Exception priority of PendSV and SysTick. Context switches must never
/// preempt application interrupt handlers, so this is the lowest priority.
pub const KERNEL_INTERRUPT_PRIORITY: u8 = 0xFF;

/// BASEPRI value written while inside a critical section. Interrupts with
/// a numerically lower (more urgent) priority stay enabled and must not
/// touch kernel state.
pub const MAX_SYSCALL_INTERRUPT_PRIORITY: u8 = 0xBF;

/// Tick count the scheduler starts from.
pub const INITIAL_TICK_COUNT: TickType = 0;

/// Unsigned tick counter. Wraps around; the delay lists handle overflow.
#[cfg(not(feature = "tick-16"))]
pub type TickType = u32;

/// Unsigned tick counter. Wraps around; the delay lists handle overflow.
#[cfg(feature = "tick-16")]
pub type TickType = u16;

/// Largest representable tick value. Also the key of every list's end
/// marker and the "nothing to wake" value of the next-unblock tick.
pub const MAX_DELAY: TickType = TickType::MAX;

const _: () = assert!(MAX_PRIORITIES >= 1 && MAX_PRIORITIES <= 32);
const _: () = assert!(IDLE_PRIORITY < MAX_PRIORITIES);
const _: () = assert!(MAX_TASKS >= 1 && MAX_TASKS <= u16::MAX as usize);
const _: () = assert!(MAX_TASK_NAME_LEN >= 1);
