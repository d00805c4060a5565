//! # Kernel
//!
//! The global scheduler instance for firmware builds and the public API
//! tasks call into.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set exception priorities
//!               ├─► Create the idle task
//!               └─► SVC → first task
//! ```

use core::cell::UnsafeCell;

use crate::arch::cortex_m3::{self, CortexM3};
use crate::config::TickType;
use crate::error::KernelError;
use crate::scheduler::Scheduler;
use crate::sync;
use crate::task::{Priority, StackWord, TaskControlBlock, TaskEntry, TaskHandle};

/// Holder for the one global scheduler.
struct KernelCell(UnsafeCell<Scheduler<CortexM3>>);

// Safety: single core. Every access happens either inside a kernel
// critical section or from the kernel's own exception handlers, which
// run at the same (lowest) priority and so never preempt each other.
unsafe impl Sync for KernelCell {}

static KERNEL: KernelCell = KernelCell(UnsafeCell::new(Scheduler::new()));

/// # Safety
/// The caller must not hold on to the reference across a point where
/// another kernel entry could run, except inside a critical section.
#[inline(always)]
unsafe fn scheduler() -> &'static mut Scheduler<CortexM3> {
    unsafe { &mut *KERNEL.0.get() }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Create a task from static buffers. See [`Scheduler::create_task`].
pub fn create_task(
    entry: TaskEntry,
    name: &str,
    args: *mut (),
    priority: Priority,
    stack: Option<&'static mut [StackWord]>,
    tcb: Option<&'static mut TaskControlBlock>,
) -> Result<TaskHandle, KernelError> {
    unsafe { scheduler() }.create_task(entry, name, args, priority, stack, tcb)
}

/// Start the scheduler. **Does not return** unless the idle task can't be
/// created.
///
/// Sets the kernel exception priorities, creates the idle task from
/// `idle_stack` and `idle_tcb`, starts SysTick and launches the highest
/// priority task.
pub fn start(
    mut core_peripherals: cortex_m::Peripherals,
    idle_stack: Option<&'static mut [StackWord]>,
    idle_tcb: Option<&'static mut TaskControlBlock>,
) -> Result<core::convert::Infallible, KernelError> {
    cortex_m3::set_interrupt_priorities(&mut core_peripherals.SCB);
    unsafe { scheduler() }.start_scheduler(idle_stack, idle_tcb)?;

    // SysTick starts counting only now that the tick state is reset.
    cortex_m3::configure_systick(&mut core_peripherals.SYST);

    unsafe { <CortexM3 as crate::port::Port>::start_first_task() }
}

/// Put the calling task to sleep for `ticks` ticks.
pub fn delay(ticks: TickType) {
    unsafe { scheduler() }.delay_current_task(ticks);
}

/// Give the CPU to the next ready task of the same or higher priority.
pub fn yield_now() {
    unsafe { scheduler() }.yield_now();
}

/// Enter a nestable critical section. Task context only.
pub fn enter_critical() {
    unsafe { scheduler() }.enter_critical();
}

/// Leave a critical section entered with [`enter_critical`].
pub fn exit_critical() {
    unsafe { scheduler() }.exit_critical();
}

/// Execute a closure inside a kernel critical section.
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    enter_critical();
    let result = f();
    exit_critical();
    result
}

/// Ticks since the scheduler started (wrapping).
pub fn tick_count() -> TickType {
    sync::from_isr::<CortexM3, _, _>(|| unsafe { scheduler() }.tick_count())
}

// ---------------------------------------------------------------------------
// Exception handler entry points
// ---------------------------------------------------------------------------

/// Saved stack pointer of the first task. Called from SVCall.
pub(crate) extern "C" fn first_task_stack() -> *mut StackWord {
    unsafe { scheduler() }.current_stack_pointer()
}

/// Store `saved_sp`, pick the next task and return its stack pointer.
/// Called from PendSV.
pub(crate) extern "C" fn switch_context(saved_sp: *mut StackWord) -> *mut StackWord {
    unsafe { scheduler() }.switch_context(saved_sp)
}

/// Called from SysTick.
pub(crate) fn tick() {
    unsafe { scheduler() }.advance_tick();
}
