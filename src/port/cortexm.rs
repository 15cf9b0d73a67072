//! Cortex-M port (ARMv7-M / ARMv8-M mainline).
//!
//! Interrupts are masked through PRIMASK. Every context switch goes through
//! PendSV, whether it comes from a kernel call or from an interrupt handler:
//! the kernel leaves the outgoing and incoming contexts in `SWITCH_FROM` and
//! `SWITCH_TO` and pends PendSV, which runs at the lowest exception priority,
//! saves the interrupted frame and returns into the incoming one. A process
//! that never calls the kernel is therefore still preempted when the timer
//! interrupt returns.
//!
//! Processes run in Thread mode on the main stack (CONTROL.SPSEL = 0), like
//! the code that creates the kernel.

use core::arch::global_asm;
use core::mem::size_of;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use ::cortex_m::asm;
use ::cortex_m::interrupt;
use ::cortex_m::peripheral::SCB;
use ::cortex_m::peripheral::scb::SystemHandler;
use ::cortex_m::register::{control, primask};

use super::{RKPort, RKBootFn, halt};
use crate::bk_assert;
use crate::memory::align_down;

//

/*
Refer exception entry behavior of ARM v7/8-M Architecture Reference Manual

sp+
0-1: [saved by PendSV, to find out the frame type first on restore]
    (R2)    LR(exc)
[saved by PendSV only if LR(exc) bit 4 is clear: FPU context active]
    S16     S17     ..      S31
+0-9: [saved by PendSV]
    (R3)    R4      R5      R6      R7      R8      R9      R10
    R11     LR(exc)
+10-17: [Basic frame saved by HW at exception entry]
    R0      R1      R2      R3      R12     LR(R14) RetAddr xPSR
[Extended frame saved by HW if FPU context was active]
    S0      ..      S15     FPSCR   (Rsvd.)
                    ^ 8-byte aligned here
*/

const FRAME_WORDS: usize = 2 + 10 + 8;

const EXC_LR: usize = 1;
const SAVED_LR: usize = 2 + 9;
const HW: usize = 2 + 10;

// Thread mode, main stack, basic frame
const EXC_RETURN_THREAD: usize = 0xffff_fff9;
// T-bit: Cortex-M only runs Thumb instructions
const XPSR_THUMB: usize = 0x0100_0000;

#[cfg(not(target_abi = "eabihf"))]
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "cpsid i",
    "push {{r3-r11, lr}}",
    "push {{r2, lr}}",
    "mov r0, sp",
    "bl rtkern_pendsv",
    "mov sp, r0",
    "pop {{r2, lr}}",
    "cpsie i",
    "pop {{r3-r11, pc}}",
);

#[cfg(target_abi = "eabihf")]
global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "cpsid i",
    "push {{r3-r11, lr}}",
    "tst lr, #0x10",
    "it eq",
    "vpusheq {{s16-s31}}",
    "push {{r2, lr}}",
    "mov r0, sp",
    "bl rtkern_pendsv",
    "mov sp, r0",
    "pop {{r2, lr}}",
    "tst lr, #0x10",
    "it eq",
    "vpopeq {{s16-s31}}",
    "cpsie i",
    "pop {{r3-r11, pc}}",
);

// where PendSV saves the outgoing stack pointer; null when abandoned
static SWITCH_FROM: AtomicPtr<usize> = AtomicPtr::new(ptr::null_mut());
// stack pointer PendSV resumes; null when no switch is pending
static SWITCH_TO: AtomicPtr<usize> = AtomicPtr::new(ptr::null_mut());

#[no_mangle]
unsafe extern "C" fn rtkern_pendsv(sp: usize) -> usize
{
    let from = SWITCH_FROM.load(Ordering::Relaxed);
    let to = SWITCH_TO.load(Ordering::Relaxed);

    if to.is_null() {
        return sp;
    }

    SWITCH_FROM.store(ptr::null_mut(), Ordering::Relaxed);
    SWITCH_TO.store(ptr::null_mut(), Ordering::Relaxed);

    if !from.is_null() {
        *from = sp;
    }

    *to
}

/// Leaves a switch for PendSV. Interrupts must be disabled.
unsafe fn pend_switch(from: *mut usize, to: *const usize)
{
    // a switch not taken yet keeps its outgoing context
    if SWITCH_TO.load(Ordering::Relaxed).is_null() {
        SWITCH_FROM.store(from, Ordering::Relaxed);
    }
    SWITCH_TO.store(to as *mut usize, Ordering::Relaxed);

    SCB::set_pendsv();
}

/// Lets the pending PendSV in from Thread mode and masks interrupts again
/// once the caller is resumed.
fn take_pendsv()
{
    asm::dsb();
    unsafe { interrupt::enable(); }
    asm::isb();
    interrupt::disable();
}

//

/// Saved stack pointer of a process that is not running
pub struct CortexMContext
{
    sp: usize
}

/// Single-core Cortex-M port
pub struct CortexMPort;

unsafe impl RKPort for CortexMPort
{
    type Context = CortexMContext;
    type IrqState = bool;

    const PREEMPTIVE: bool = true;

    fn main_context(&self) -> CortexMContext
    {
        bk_assert!(control::read().spsel().is_msp(), "CONTROL.SPSEL: must be SP_main");

        unsafe {
            let mut p = ::cortex_m::Peripherals::steal();
            p.SCB.set_priority(SystemHandler::PendSV, 0xff);
        }

        // filled in by the first switch away from main
        CortexMContext {
            sp: 0
        }
    }

    unsafe fn init_context(&self, stack: *mut u8, stack_len: usize, boot: RKBootFn, data: *mut u8)
        -> Option<CortexMContext>
    {
        let top = align_down(stack as usize + stack_len, 8);
        let frame = FRAME_WORDS * size_of::<usize>();

        if top < stack as usize + frame {
            return None;
        }

        let sp = (top - frame) as *mut usize;

        for i in 0..FRAME_WORDS {
            sp.add(i).write_volatile(0);
        }
        sp.add(EXC_LR).write_volatile(EXC_RETURN_THREAD);
        sp.add(SAVED_LR).write_volatile(EXC_RETURN_THREAD);

        // R0
        sp.add(HW).write_volatile(data as usize);
        // LR(R14): boot never returns
        sp.add(HW + 5).write_volatile(halt as usize);
        // RetAddr
        sp.add(HW + 6).write_volatile(boot as usize & !1);
        // xPSR
        sp.add(HW + 7).write_volatile(XPSR_THUMB);

        Some(CortexMContext {
            sp: sp as usize
        })
    }

    unsafe fn switch_context(&self, from: *mut CortexMContext, to: *const CortexMContext)
    {
        pend_switch(&mut (*from).sp, &(*to).sp);
        take_pendsv();
    }

    unsafe fn exit_context(&self, to: *const CortexMContext)
    {
        pend_switch(ptr::null_mut(), &(*to).sp);
        take_pendsv();

        // not reached: nothing resumes an abandoned context
        halt();
    }

    unsafe fn request_preempt(&self, from: *mut CortexMContext, to: *const CortexMContext)
    {
        // taken when the outermost handler returns to Thread mode
        pend_switch(&mut (*from).sp, &(*to).sp);
    }

    fn irq_save_disable(&self) -> bool
    {
        let enabled = primask::read().is_inactive();
        interrupt::disable();
        enabled
    }

    fn irq_restore(&self, was_enabled: bool)
    {
        if was_enabled {
            unsafe { interrupt::enable(); }
        }
    }

    fn irq_enable(&self)
    {
        unsafe { interrupt::enable(); }
    }

    fn irq_enabled(&self) -> bool
    {
        primask::read().is_inactive()
    }

    fn idle(&self)
    {
        // a pending interrupt wakes wfi even while masked
        asm::wfi();
        unsafe { interrupt::enable(); }
        asm::isb();
        interrupt::disable();
    }
}
