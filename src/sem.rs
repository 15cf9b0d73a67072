use core::cell::UnsafeCell;

use crate::RKProcId;
use crate::kernel::{RKKernel, RKProcState, RKQueue};
use crate::prilist::PriList;
use crate::port::RKPort;
use crate::bk_assert;

//

pub(crate) struct SemInner
{
    pub(crate) owner: Option<RKProcId>,
    pub(crate) wait: PriList<RKProcId>
}

/// Binary semaphore with priority inheritance
///
/// Waiters are served highest priority first, FIFO among equals. While a
/// process waits, the owner runs at no lower priority than the waiter
/// (when `RKConfig::pri_inherit` is set).
///
/// A semaphore must not move while processes wait on it, which borrowing
/// already guarantees.
pub struct RKSemaphore
{
    inner: UnsafeCell<SemInner>
}

// only touched with interrupts disabled
unsafe impl Sync for RKSemaphore {}

impl RKSemaphore
{
    /// Creates an unlocked semaphore.
    pub const fn new() -> RKSemaphore
    {
        RKSemaphore {
            inner: UnsafeCell::new(SemInner {
                owner: None,
                wait: PriList::new()
            })
        }
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn inner(&self) -> &mut SemInner
    {
        &mut *self.inner.get()
    }

    /// Locks the semaphore, blocking while another process owns it.
    /// * `k` - kernel the calling process runs on.
    /// * Obtaining a semaphore the caller already owns is fatal.
    pub fn obtain<P: RKPort>(&self, k: &RKKernel<'_, P>)
    {
        if self.attempt(k) {
            return;
        }

        k.assert_may_block();

        k.cs(|| {
            let st = unsafe { k.st() };
            let cur = st.cur();
            let s = unsafe { self.inner() };

            if s.owner.is_none() {
                // released in between
                s.owner = Some(cur);
                st.proc(cur).held += 1;
                return;
            }

            let p = st.proc(cur);
            p.state = RKProcState::Blocked;
            p.queue = RKQueue::Sem(s as *mut SemInner);

            s.wait.enqueue_tail(&mut st.procs, cur);
            k.inherit(s);

            k.schedule();

            // ownership handed over by release
            let owner = unsafe { self.inner() }.owner;
            bk_assert!(owner == Some(cur), "process {} woke up without the semaphore", cur);
        });
    }

    /// Locks the semaphore if nobody owns it. Never blocks.
    /// * Returns `true` if the caller became the owner.
    pub fn attempt<P: RKPort>(&self, k: &RKKernel<'_, P>) -> bool
    {
        k.cs(|| {
            let st = unsafe { k.st() };
            let cur = st.cur();
            let s = unsafe { self.inner() };

            bk_assert!(st.in_isr == 0, "semaphore used in interrupt context");

            match s.owner {
                None => {
                    s.owner = Some(cur);
                    st.proc(cur).held += 1;
                    true
                }
                Some(owner) => {
                    bk_assert!(owner != cur,
                               "process {} obtains a semaphore it owns", cur);
                    false
                }
            }
        })
    }

    /// Unlocks the semaphore, handing it to the highest priority waiter.
    /// * The caller keeps the priority inherited through the semaphores it
    ///   still holds and otherwise drops back to its base priority.
    /// * Releasing a semaphore the caller does not own is fatal.
    pub fn release<P: RKPort>(&self, k: &RKKernel<'_, P>)
    {
        k.cs(|| {
            let st = unsafe { k.st() };
            let cur = st.cur();
            let s = unsafe { self.inner() };

            bk_assert!(s.owner == Some(cur),
                       "process {} releases a semaphore it does not own", cur);

            st.proc(cur).held -= 1;

            let next = s.wait.pop_head(&mut st.procs);
            s.owner = next;

            let pri = k.effective_pri(cur);
            st.proc(cur).pri = pri;

            if let Some(next) = next {
                let n = st.proc(next);
                n.held += 1;
                n.queue = RKQueue::None;

                // the remaining waiters now wait on `next`
                let pri = k.effective_pri(next);
                st.proc(next).pri = pri;

                k.wakeup(next);
            }
        });

        k.preempt_point();
    }

    /// Whether some process owns the semaphore.
    pub fn is_locked<P: RKPort>(&self, k: &RKKernel<'_, P>) -> bool
    {
        self.owner(k).is_some()
    }

    /// Gets the owning process if any.
    pub fn owner<P: RKPort>(&self, k: &RKKernel<'_, P>) -> Option<RKProcId>
    {
        k.cs(|| unsafe { self.inner() }.owner)
    }
}

impl Default for RKSemaphore
{
    fn default() -> Self
    {
        RKSemaphore::new()
    }
}
