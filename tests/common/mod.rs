#![allow(dead_code)]

use tickos::arch::sim::SimPort;
use tickos::config::MINIMAL_STACK_SIZE;
use tickos::{Priority, Scheduler, StackWord, TaskControlBlock, TaskHandle, TickType};

pub const STACK_WORDS: usize = 64;

pub extern "C" fn noop_task(_: *mut ()) {}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A fresh scheduler on a freshly reset simulated machine.
pub fn scheduler() -> Box<Scheduler<SimPort>> {
    scheduler_at(tickos::config::INITIAL_TICK_COUNT)
}

pub fn scheduler_at(tick: TickType) -> Box<Scheduler<SimPort>> {
    init_logger();
    SimPort::reset();
    Box::new(Scheduler::with_initial_tick_count(tick))
}

pub fn stack(words: usize) -> Option<&'static mut [StackWord]> {
    Some(Box::leak(vec![0; words].into_boxed_slice()))
}

pub fn tcb() -> Option<&'static mut TaskControlBlock> {
    Some(Box::leak(Box::new(TaskControlBlock::new())))
}

pub fn spawn(sched: &mut Scheduler<SimPort>, name: &str, priority: Priority) -> TaskHandle {
    sched
        .create_task(
            noop_task,
            name,
            core::ptr::null_mut(),
            priority,
            stack(STACK_WORDS),
            tcb(),
        )
        .unwrap()
}

/// Create the idle task and reset the tick state. Returns the idle task.
pub fn start(sched: &mut Scheduler<SimPort>) -> TaskHandle {
    sched
        .start_scheduler(stack(MINIMAL_STACK_SIZE), tcb())
        .unwrap()
}

/// `n` consecutive selections.
pub fn selections(sched: &mut Scheduler<SimPort>, n: usize) -> Vec<TaskHandle> {
    (0..n).map(|_| sched.select_next_task().unwrap()).collect()
}

pub fn tick_n(sched: &mut Scheduler<SimPort>, n: usize) -> usize {
    (0..n).map(|_| sched.advance_tick()).sum()
}
