//! Signals: eight event bits per process, no payload.
//!
//! Bits that arrive while nobody waits for them stay pending until a wait or
//! `sig_check` consumes them.

use crate::{RKProcId, RKSigMask, RKTicks};
use crate::kernel::{RKKernel, RKProcState};
use crate::port::RKPort;
use crate::bk_assert;

/// Free for applications.
pub const SIG_USER0: RKSigMask = 1 << 0;
/// Free for applications.
pub const SIG_USER1: RKSigMask = 1 << 1;
/// Free for applications.
pub const SIG_USER2: RKSigMask = 1 << 2;
/// Free for applications.
pub const SIG_USER3: RKSigMask = 1 << 3;
/// Delivered by the timer of `sig_wait_timeout`.
pub const SIG_TIMEOUT: RKSigMask = 1 << 4;
/// Reserved: message queue receivers wait on it.
pub const SIG_SYSTEM5: RKSigMask = 1 << 5;
/// Reserved: message queue senders wait on it.
pub const SIG_SYSTEM6: RKSigMask = 1 << 6;
/// Reserved: `sleep`.
pub const SIG_SINGLE: RKSigMask = 1 << 7;

impl<'a, P: RKPort> RKKernel<'a, P>
{
    /// Waits for any of the signals in `sigs`.
    /// * Returns the delivered subset of `sigs`, which is cleared.
    /// * Returns at once if one of them is already pending.
    /// * Fatal with interrupts disabled, with preemption forbidden or inside `isr`.
    pub fn sig_wait(&self, sigs: RKSigMask) -> RKSigMask
    {
        bk_assert!(sigs != 0, "waiting for no signal");

        self.assert_may_block();

        self.cs(|| {
            loop {
                let st = unsafe { self.st() };
                let p = st.proc(st.cur());

                let got = p.sig_recv & sigs;
                if got != 0 {
                    p.sig_recv &= !got;
                    break got;
                }

                // the sender clears sig_wait before making us ready again
                p.sig_wait = sigs;
                p.state = RKProcState::Blocked;

                self.schedule();
            }
        })
    }

    /// Waits for any of the signals in `sigs` for at most `timeout` ticks.
    /// * Returns the delivered subset of `sigs`, with `SIG_TIMEOUT` added if
    ///   the time ran out.
    /// * `timeout == 0` only polls: returns pending bits or `SIG_TIMEOUT`.
    pub fn sig_wait_timeout(&self, sigs: RKSigMask, timeout: RKTicks) -> RKSigMask
    {
        bk_assert!(sigs & SIG_TIMEOUT == 0, "SIG_TIMEOUT is reserved");

        if timeout == 0 {
            let got = self.sig_check(sigs);
            return if got != 0 {got} else {SIG_TIMEOUT};
        }

        self.arm_timer(SIG_TIMEOUT, timeout);

        let got = self.sig_wait(sigs | SIG_TIMEOUT);

        self.disarm_timer(SIG_TIMEOUT);

        got
    }

    /// Blocks the running process for `ticks` ticks.
    /// * `ticks == 0` just yields.
    pub fn sleep(&self, ticks: RKTicks)
    {
        if ticks == 0 {
            self.yield_now();
            return;
        }

        self.arm_timer(SIG_SINGLE, ticks);

        self.sig_wait(SIG_SINGLE);

        self.disarm_timer(SIG_SINGLE);
    }

    fn arm_timer(&self, sig: RKSigMask, ticks: RKTicks)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let expire = st.ticks.wrapping_add(ticks);
            let p = st.proc(st.cur());

            p.sig_recv &= !sig;
            p.timer = Some((expire, sig));
        });
    }

    fn disarm_timer(&self, sig: RKSigMask)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let p = st.proc(st.cur());

            p.timer = None;
            p.sig_recv &= !sig;
        });
    }

    /// Polls and clears the signals in `sigs` of the running process.
    /// * Returns the pending subset of `sigs`. Never blocks.
    pub fn sig_check(&self, sigs: RKSigMask) -> RKSigMask
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let p = st.proc(st.cur());

            let got = p.sig_recv & sigs;
            p.sig_recv &= !got;
            got
        })
    }

    /// Sends signals and lets the receiver run at once if it was waiting for
    /// one of them and its priority is not below the caller's.
    /// * `pid` - receiving process, never the caller.
    /// * Process context only, with preemption allowed.
    pub fn sig_send(&self, pid: RKProcId, sigs: RKSigMask)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let cur = st.cur();

            bk_assert!(st.in_isr == 0, "sig_send in interrupt context");
            bk_assert!(cur != pid, "process {} signals itself", pid);
            bk_assert!(st.proc(cur).forbid == 0, "sig_send with preemption forbidden");

            if self.sig_deliver(pid, sigs) {
                self.wakeup(pid);
            }
        });
    }

    /// Posts signals: a receiver waiting for one of them is queued first
    /// among its priority.
    /// * Callable inside `isr` and with preemption forbidden.
    pub fn sig_post(&self, pid: RKProcId, sigs: RKSigMask)
    {
        self.cs(|| self.sig_deliver_post(pid, sigs));

        self.preempt_point();
    }

    /// Interrupts must be disabled.
    pub(crate) fn sig_deliver_post(&self, pid: RKProcId, sigs: RKSigMask)
    {
        if self.sig_deliver(pid, sigs) {
            unsafe { self.st() }.make_ready(pid, true);
        }
    }

    /// Sets `sigs` pending on `pid`. Returns whether that ends its wait.
    /// Interrupts must be disabled.
    fn sig_deliver(&self, pid: RKProcId, sigs: RKSigMask) -> bool
    {
        let st = unsafe { self.st() };
        let p = st.proc(pid);

        match p.state {
            RKProcState::Free | RKProcState::Zombie => {
                log::trace!("signal {:#04x} to gone process {} dropped", sigs, pid);
                return false;
            }
            _ => {}
        }

        p.sig_recv |= sigs;

        if p.state == RKProcState::Blocked && (p.sig_wait & sigs) != 0 {
            p.sig_wait = 0;
            true
        }
        else {
            false
        }
    }
}
