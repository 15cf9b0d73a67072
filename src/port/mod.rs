//! CPU capability boundary.
//!
//! The portable kernel never touches registers. Everything CPU specific goes
//! through [`RKPort`]: masking interrupts, building the first frame of a new
//! process, switching stacks, preempting from an interrupt, and sleeping until
//! the next interrupt.

#[cfg(feature = "std")]
pub mod hosted;

#[cfg(target_arch = "arm")]
pub mod cortexm;

/// Entry of a new context: called once with the `data` given to
/// [`RKPort::init_context`]. Interrupts may still be disabled.
pub type RKBootFn = unsafe extern "C-unwind" fn(*mut u8);

/// CPU specific operations needed by the kernel.
///
/// # Safety
/// Implementations must really provide mutual exclusion between a critical
/// section (`irq_save_disable` .. `irq_restore`) and every interrupt handler
/// that enters the kernel, and `switch_context` must resume exactly the
/// context it is given.
pub unsafe trait RKPort: Sync
{
    /// Saved state of a process that is not running
    type Context: Send;
    /// Token returned by `irq_save_disable`
    type IrqState: Copy;

    /// Context describing the caller, which becomes the main process.
    fn main_context(&self) -> Self::Context;

    /// Prepares a context that calls `boot(data)` on its first dispatch.
    /// * `stack` .. `stack + stack_len` is the stack the process may use.
    /// * Returns `None` if the context cannot be created.
    ///
    /// # Safety
    /// The stack region must stay valid and unused by anyone else until the
    /// context is dropped.
    unsafe fn init_context(&self, stack: *mut u8, stack_len: usize, boot: RKBootFn, data: *mut u8)
        -> Option<Self::Context>;

    /// Saves the running context into `from` and resumes `to`.
    /// Returns when someone switches back to `from`.
    ///
    /// # Safety
    /// Interrupts must be disabled; `from` must be the running context.
    unsafe fn switch_context(&self, from: *mut Self::Context, to: *const Self::Context);

    /// Resumes `to`, abandoning the running context for good.
    /// A hosted port returns to let the abandoned thread finish; the caller
    /// must not touch kernel state afterwards.
    ///
    /// # Safety
    /// Interrupts must be disabled.
    unsafe fn exit_context(&self, to: *const Self::Context);

    /// Disables interrupts and returns the previous state.
    fn irq_save_disable(&self) -> Self::IrqState;

    /// Restores the state returned by `irq_save_disable`.
    fn irq_restore(&self, state: Self::IrqState);

    /// Enables interrupts unconditionally. Used by a process on its first run.
    fn irq_enable(&self);

    /// Whether the caller runs with interrupts enabled.
    fn irq_enabled(&self) -> bool;

    /// Called with interrupts disabled when nothing is ready to run: lets
    /// pending interrupts in, waits for one, and disables interrupts again.
    fn idle(&self);

    /// Whether the port implements `request_preempt`. The kernel never calls
    /// it otherwise, and preemption waits for the next preemption point.
    const PREEMPTIVE: bool = false;

    /// Called at the end of the outermost `RKKernel::isr` when the
    /// interrupted process has to give the CPU away. Saves the interrupted
    /// context into `from` and resumes `to` once the handler returns.
    /// * Another request before the switch is taken keeps `from` and only
    ///   replaces `to`.
    ///
    /// # Safety
    /// Interrupts must be disabled; `from` must be the interrupted context
    /// and `to` a context that is not running.
    unsafe fn request_preempt(&self, from: *mut Self::Context, to: *const Self::Context)
    {
        let _ = (from, to);
        crate::bk_panic!("port cannot preempt from an interrupt");
    }
}

/// Stops the system after a broken invariant in release builds.
pub fn halt() -> !
{
    #[cfg(target_arch = "arm")]
    {
        loop {
            ::cortex_m::asm::bkpt();
        }
    }

    #[cfg(not(target_arch = "arm"))]
    {
        panic!("rtkern: halted")
    }
}
