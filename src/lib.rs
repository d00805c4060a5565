//! # Tickos
//!
//! A small preemptive, priority-based real-time kernel for ARM Cortex-M3
//! microcontrollers.
//!
//! ## Overview
//!
//! - **Fixed priorities**: the highest-priority ready task always runs;
//!   `0` is the idle level.
//! - **Round robin** among tasks of equal priority, sliced by the tick.
//! - **Delays** measured in ticks, with correct behavior across tick
//!   counter wraparound.
//! - **Static memory only**: stacks and task control blocks are supplied
//!   by the application; the kernel never allocates.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │              Kernel API (kernel.rs, firmware)           │
//! │   create_task() · start() · delay() · yield_now()       │
//! ├────────────────────────────────────────────────────────┤
//! │                  Scheduler (scheduler.rs)               │
//! │   select_next_task() · advance_tick() · delay_current() │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │ Ready queues │   Delay lists    │  Critical sections   │
//! │ ready.rs     │   delay.rs       │  sync.rs             │
//! ├──────────────┴──────────────────┴──────────────────────┤
//! │       Ordered intrusive lists (list.rs) · TCB (task.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │   Port trait (port.rs): arch/cortex_m3.rs · arch/sim.rs │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all kernel state lives in one [`Scheduler`](scheduler::Scheduler)
//! - **Arena lists**: list links are indices into a fixed node arena, one
//!   node per task slot
//! - **Critical sections**: interrupt masking through the [`Port`](port::Port)
//!
//! On hosted targets the crate links `std` for the simulated port only.

#![no_std]

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod arch;
pub mod config;
mod delay;
pub mod error;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
pub mod list;
pub mod port;
mod ready;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use config::TickType;
pub use error::{InvariantViolation, KernelError};
pub use port::Port;
pub use scheduler::Scheduler;
pub use task::{DelayList, Priority, StackWord, TaskControlBlock, TaskEntry, TaskHandle, TaskState};
