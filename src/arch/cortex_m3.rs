//! # Cortex-M3 Port Layer
//!
//! Hardware-specific code for the ARMv7-M (Thumb-2) profile, as found on
//! the STM32F103. Context switching via PendSV, first-task launch via SVC,
//! the tick from SysTick, and BASEPRI-based critical sections.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M3 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): Used by tasks in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore.
//!
//! ## Interrupt Priorities
//!
//! - SysTick, PendSV: [`KERNEL_INTERRUPT_PRIORITY`] (lowest)
//! - Critical sections raise BASEPRI to [`MAX_SYSCALL_INTERRUPT_PRIORITY`].
//!   Interrupts above that ceiling are never masked by the kernel and must
//!   not call into it.

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use cortex_m::register::basepri;

use crate::config::{
    KERNEL_INTERRUPT_PRIORITY, MAX_SYSCALL_INTERRUPT_PRIORITY, SYSTEM_CLOCK_HZ, TICK_HZ,
};
use crate::port::Port;
use crate::task::{StackWord, TaskEntry};

/// xPSR with only the Thumb bit set.
const INITIAL_XPSR: StackWord = 0x0100_0000;

/// Exception return loads the PC into an even address.
const START_ADDRESS_MASK: StackWord = !0x1;

/// The Cortex-M3 port.
#[derive(Debug, Clone, Copy)]
pub struct CortexM3;

impl Port for CortexM3 {
    type InterruptMask = u8;
    // Eight hardware-stacked words plus R4–R11.
    const FRAME_WORDS: usize = 16;

    unsafe fn init_stack_frame(
        top_of_stack: *mut StackWord,
        entry: TaskEntry,
        args: *mut (),
    ) -> *mut StackWord {
        unsafe {
            // Exception frame, popped by the hardware on exception return
            let mut sp = top_of_stack.sub(1);
            sp.write(INITIAL_XPSR);
            sp = sp.sub(1);
            sp.write(entry as usize & START_ADDRESS_MASK);
            sp = sp.sub(1);
            sp.write(task_exit_error as usize);
            // R12, R3, R2, R1
            sp = sp.sub(5);
            sp.write(args as usize);
            // R11..R4, restored by the dispatcher
            sp.sub(8)
        }
    }

    unsafe fn start_first_task() -> ! {
        unsafe {
            asm!(
                // Reset MSP to the initial value from the vector table;
                // main's stack frame is never coming back.
                "movw r0, #0xED08",
                "movt r0, #0xE000",
                "ldr r0, [r0]",
                "ldr r0, [r0]",
                "msr msp, r0",
                "cpsie i",
                "cpsie f",
                "dsb",
                "isb",
                "svc 0",
                "nop",
                options(noreturn)
            );
        }
    }

    #[inline]
    fn request_switch() {
        SCB::set_pendsv();
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    #[inline]
    fn disable_interrupts() {
        unsafe { basepri::write(MAX_SYSCALL_INTERRUPT_PRIORITY) };
        cortex_m::asm::isb();
        cortex_m::asm::dsb();
    }

    #[inline]
    fn enable_interrupts() {
        unsafe { basepri::write(0) };
    }

    #[inline]
    fn raise_mask_from_isr() -> u8 {
        let previous = basepri::read();
        unsafe { basepri::write(MAX_SYSCALL_INTERRUPT_PRIORITY) };
        cortex_m::asm::isb();
        cortex_m::asm::dsb();
        previous
    }

    #[inline]
    fn restore_mask_from_isr(mask: u8) {
        unsafe { basepri::write(mask) };
    }

    fn in_interrupt() -> bool {
        !matches!(SCB::vect_active(), VectActive::ThreadMode)
    }

    #[inline]
    fn highest_set_bit(mask: u32) -> Option<usize> {
        // Compiles to a single CLZ.
        (mask != 0).then(|| 31 - mask.leading_zeros() as usize)
    }
}

// ---------------------------------------------------------------------------
// SysTick and exception priorities
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire at `TICK_HZ` from the core clock.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Put PendSV and SysTick at the lowest exception priority so a context
/// switch never preempts an application interrupt handler.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::PendSV, KERNEL_INTERRUPT_PRIORITY);
        scb.set_priority(SystemHandler::SysTick, KERNEL_INTERRUPT_PRIORITY);
    }
}

/// Where a task lands if its entry function returns. Tasks must not
/// return, so this only parks the CPU for a debugger to find.
extern "C" fn task_exit_error() -> ! {
    log::error!("task returned from its entry function");
    cortex_m::interrupt::disable();
    loop {
        cortex_m::asm::nop();
    }
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// SVC handler, used exactly once to launch the first task.
///
/// Restores R4–R11 from the selected task's initial frame, switches
/// Thread mode to PSP and returns into the task with interrupts unmasked.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "bl {first_sp}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "movs r0, #0",
        "msr basepri, r0",
        // EXC_RETURN 0xFFFF_FFFD: Thread mode, process stack
        "mvn r0, #2",
        "bx r0",
        first_sp = sym crate::kernel::first_task_stack,
    );
}

/// PendSV handler: the context switch.
///
/// 1. Save R4–R11 onto the outgoing task's stack (PSP)
/// 2. Hand the resulting stack pointer to the scheduler, which stores it,
///    selects the next task and returns that task's stack pointer
/// 3. Restore R4–R11 from the incoming task's stack
/// 4. Return from exception (hardware restores the rest)
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "isb",
        "stmdb r0!, {{r4-r11}}",
        "push {{r3, lr}}",
        "bl {switch}",
        "pop {{r3, lr}}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "isb",
        "bx lr",
        switch = sym crate::kernel::switch_context,
    );
}

/// SysTick handler: one kernel tick.
#[unsafe(no_mangle)]
pub extern "C" fn SysTick() {
    crate::kernel::tick();
}
