//! # Tickos Example Firmware
//!
//! Three tasks on an STM32F103 ("Blue Pill"):
//!
//! | Task | Priority | Behavior |
//! |------|----------|----------|
//! | `heartbeat` | 3 | Counts a heartbeat every 500 ticks |
//! | `sampler` | 2 | Takes a sample every `args` ticks |
//! | `background` | 1 | Busy work, yields after every batch |
//!
//! Plus the idle task at priority 0, created by `kernel::start`.
//!
//! ## Expected Schedule
//!
//! 1. `heartbeat` runs first and goes to sleep straight away.
//! 2. `sampler` runs next and sleeps for its period.
//! 3. `background` soaks up all remaining CPU time; idle only runs if it
//!    is ever delayed too.
//! 4. Every wake-up preempts `background` at the next tick.
//!
//! Built for a hosted target, this binary instead replays the same task
//! set on the simulated port and prints the schedule.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use core::sync::atomic::{AtomicU32, Ordering};

use tickos::TickType;

const HEARTBEAT_PERIOD: TickType = 500;
const SAMPLE_PERIOD: TickType = 20;

static HEARTBEATS: AtomicU32 = AtomicU32::new(0);
static SAMPLES: AtomicU32 = AtomicU32::new(0);

#[cfg(target_os = "none")]
mod firmware {
    use core::convert::Infallible;
    use core::ptr;

    use cortex_m_rt::entry;
    use panic_halt as _;

    use tickos::config::MINIMAL_STACK_SIZE;
    use tickos::kernel;
    use tickos::{KernelError, StackWord, TaskControlBlock, TickType};

    use super::*;

    const STACK_WORDS: usize = 256;

    extern "C" fn heartbeat_task(_: *mut ()) {
        loop {
            HEARTBEATS.fetch_add(1, Ordering::Relaxed);
            kernel::delay(HEARTBEAT_PERIOD);
        }
    }

    extern "C" fn sampler_task(args: *mut ()) {
        let period = args as usize as TickType;
        loop {
            kernel::critical_section(|| {
                SAMPLES.fetch_add(1, Ordering::Relaxed);
            });
            kernel::delay(period);
        }
    }

    extern "C" fn background_task(_: *mut ()) {
        let mut work: u32 = 0;
        loop {
            for _ in 0..1000 {
                work = work.wrapping_add(1);
            }
            kernel::yield_now();
        }
    }

    fn halt(err: KernelError) -> ! {
        log::error!("kernel start-up failed: {err}");
        loop {
            cortex_m::asm::wfi();
        }
    }

    fn run() -> Result<Infallible, KernelError> {
        kernel::create_task(
            heartbeat_task,
            "heartbeat",
            ptr::null_mut(),
            3,
            cortex_m::singleton!(: [StackWord; STACK_WORDS] = [0; STACK_WORDS])
                .map(|s| s.as_mut_slice()),
            cortex_m::singleton!(: TaskControlBlock = TaskControlBlock::new()),
        )?;

        kernel::create_task(
            sampler_task,
            "sampler",
            SAMPLE_PERIOD as usize as *mut (),
            2,
            cortex_m::singleton!(: [StackWord; STACK_WORDS] = [0; STACK_WORDS])
                .map(|s| s.as_mut_slice()),
            cortex_m::singleton!(: TaskControlBlock = TaskControlBlock::new()),
        )?;

        kernel::create_task(
            background_task,
            "background",
            ptr::null_mut(),
            1,
            cortex_m::singleton!(: [StackWord; STACK_WORDS] = [0; STACK_WORDS])
                .map(|s| s.as_mut_slice()),
            cortex_m::singleton!(: TaskControlBlock = TaskControlBlock::new()),
        )?;

        let Some(cp) = cortex_m::Peripherals::take() else {
            loop {
                cortex_m::asm::wfi();
            }
        };

        kernel::start(
            cp,
            cortex_m::singleton!(: [StackWord; MINIMAL_STACK_SIZE] = [0; MINIMAL_STACK_SIZE])
                .map(|s| s.as_mut_slice()),
            cortex_m::singleton!(: TaskControlBlock = TaskControlBlock::new()),
        )
    }

    /// Firmware entry point. Creates the tasks and starts the scheduler.
    #[entry]
    fn main() -> ! {
        match run() {
            Ok(never) => match never {},
            Err(err) => halt(err),
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    simulation::run(2_000);
}

/// Host replay of the firmware's task set on the simulated port. Task
/// bodies can't execute here, so each dispatch applies what that task's
/// loop would do next.
#[cfg(not(target_os = "none"))]
mod simulation {
    use std::ptr;

    use tickos::arch::sim::SimPort;
    use tickos::config::MINIMAL_STACK_SIZE;
    use tickos::{Scheduler, StackWord, TaskControlBlock, TaskHandle, TickType};

    use super::*;

    extern "C" fn placeholder(_: *mut ()) {}

    #[derive(Clone, Copy)]
    enum Behavior {
        Periodic(TickType, &'static AtomicU32),
        Busy,
        Idle,
    }

    fn buffers(
        words: usize,
    ) -> (Option<&'static mut [StackWord]>, Option<&'static mut TaskControlBlock>) {
        (
            Some(Box::leak(vec![0; words].into_boxed_slice())),
            Some(Box::leak(Box::new(TaskControlBlock::new()))),
        )
    }

    pub fn run(ticks: u32) {
        let scheduler: &mut Scheduler<SimPort> = Box::leak(Box::new(Scheduler::new()));
        let mut behaviors: Vec<(TaskHandle, Behavior)> = Vec::new();

        let tasks = [
            ("heartbeat", 3, Behavior::Periodic(HEARTBEAT_PERIOD, &HEARTBEATS)),
            ("sampler", 2, Behavior::Periodic(SAMPLE_PERIOD, &SAMPLES)),
            ("background", 1, Behavior::Busy),
        ];
        for (name, priority, behavior) in tasks {
            let (stack, tcb) = buffers(256);
            match scheduler.create_task(placeholder, name, ptr::null_mut(), priority, stack, tcb) {
                Ok(handle) => behaviors.push((handle, behavior)),
                Err(err) => {
                    eprintln!("failed to create `{name}`: {err}");
                    return;
                }
            }
        }

        let (stack, tcb) = buffers(MINIMAL_STACK_SIZE);
        match scheduler.start_scheduler(stack, tcb) {
            Ok(idle) => behaviors.push((idle, Behavior::Idle)),
            Err(err) => {
                eprintln!("failed to start: {err}");
                return;
            }
        }

        let behavior_of = |task: TaskHandle| {
            behaviors
                .iter()
                .find(|(handle, _)| *handle == task)
                .map_or(Behavior::Idle, |&(_, behavior)| behavior)
        };

        let mut last = None;
        for _ in 0..ticks {
            // Dispatch until the running task stays put for this tick.
            loop {
                let Some(current) = scheduler.current_task() else {
                    break;
                };
                if last != Some(current) {
                    if let Some(tcb) = scheduler.tcb(current) {
                        println!("[{:>5}] run {}", scheduler.tick_count(), tcb.name_str());
                    }
                    last = Some(current);
                }
                match behavior_of(current) {
                    Behavior::Periodic(period, counter) => {
                        counter.fetch_add(1, Ordering::Relaxed);
                        scheduler.delay_current_task(period);
                    }
                    Behavior::Busy | Behavior::Idle => break,
                }
                if SimPort::take_pending_switch() {
                    scheduler.select_next_task();
                }
            }

            scheduler.advance_tick();
            if SimPort::take_pending_switch() {
                scheduler.select_next_task();
            }
        }

        println!(
            "{} ticks: {} heartbeats, {} samples",
            scheduler.tick_count(),
            HEARTBEATS.load(Ordering::Relaxed),
            SAMPLES.load(Ordering::Relaxed)
        );
    }
}
