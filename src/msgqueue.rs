use core::mem::{size_of, align_of, ManuallyDrop};
use core::ptr::{self, NonNull};

use crate::RKProcId;
use crate::kernel::{RKKernel, RKError};
use crate::heap::RKHeap;
use crate::memory::{RKRawArray, align_up};
use crate::port::RKPort;
use crate::signal::{SIG_SYSTEM5, SIG_SYSTEM6};
use crate::bk_assert;
use crate::bkptpanic::BKUnwrap;

//

fn wrap_inc(x: usize, bound: usize) -> usize
{
    let y = x + 1;
    if y < bound {y} else {0}
}

fn wrap_diff(x: usize, y: usize, bound: usize) -> usize
{
    if x >= y {
        x - y
    }
    else {
        x + (bound - y)
    }
}

//

struct QueueState<M>
{
    refs: u8,
    mem: RKRawArray<Option<M>>,
    wr_idx: usize,
    rd_idx: usize,
    wr_pid: Option<RKProcId>,
    rd_pid: Option<RKProcId>
}

/// One heap block: the state header followed by the entries.
struct Chan<'a, P: RKPort, M>
{
    k: &'a RKKernel<'a, P>,
    q: NonNull<QueueState<M>>,
    size: usize
}

impl<'a, P: RKPort, M> Chan<'a, P, M>
{
    fn alloc(k: &'a RKKernel<'a, P>, len: usize) -> Result<Chan<'a, P, M>, RKError>
    {
        bk_assert!(len > 0, "message queue without entries");
        bk_assert!(align_of::<QueueState<M>>() <= RKHeap::UNIT && align_of::<Option<M>>() <= RKHeap::UNIT,
                   "message alignment over {} bytes", RKHeap::UNIT);

        // one entry always stays vacant to tell full from empty
        let slots = len + 1;
        let offset = align_up(size_of::<QueueState<M>>(), align_of::<Option<M>>());
        let size = offset + slots * size_of::<Option<M>>();

        let blk = match k.heap_alloc(size) {
            Some(blk) => blk,
            None => {
                log::warn!("msgq: no {} bytes for {} entries", size, len);
                return Err(RKError::NoMemory);
            }
        };

        let q = blk.cast::<QueueState<M>>();

        unsafe {
            let mem = RKRawArray::from_raw(blk.as_ptr().add(offset) as *mut Option<M>, slots);
            for i in 0..slots {
                mem.write(i, None);
            }

            q.as_ptr().write(QueueState {
                refs: 1,
                mem,
                wr_idx: 0,
                rd_idx: 0,
                wr_pid: None,
                rd_pid: None
            });
        }

        Ok(Chan {
            k,
            q,
            size
        })
    }

    #[allow(clippy::mut_from_ref)]
    fn state(&self) -> &mut QueueState<M>
    {
        unsafe { &mut *self.q.as_ptr() }
    }

    fn share(&self) -> Chan<'a, P, M>
    {
        Chan {
            k: self.k,
            q: self.q,
            size: self.size
        }
    }

    fn release(&self)
    {
        let s = self.state();

        let last = self.k.cs(|| {
            s.refs -= 1;
            s.refs == 0
        });

        if last {
            for i in 0..s.mem.len() {
                s.mem.refer(i).take();
            }

            unsafe {
                ptr::drop_in_place(self.q.as_ptr());
                self.k.heap_free(self.q.cast(), self.size);
            }
        }
    }
}

//

/// Message queue for process-to-process communication
///
/// A bounded ring buffer taken from the kernel heap. Split it with `ch` into
/// one sender and one receiver; the buffer goes back to the heap when both
/// are dropped.
pub struct RKMsgQueue<'a, P: RKPort, M>
{
    chan: Chan<'a, P, M>
}

impl<'a, P: RKPort, M> RKMsgQueue<'a, P, M>
{
    /// Creates a message queue.
    /// * `k` - kernel whose heap holds the entries.
    /// * `len` - number of messages the queue can hold.
    /// * Returns the created message queue, or `RKError::NoMemory`.
    pub fn new(k: &'a RKKernel<'a, P>, len: usize) -> Result<RKMsgQueue<'a, P, M>, RKError>
    {
        Ok(RKMsgQueue {
            chan: Chan::alloc(k, len)?
        })
    }

    /// Gets sending and receiving channels.
    /// * Returns a tuple of the sender and receiver pair.
    pub fn ch(self) -> (RKMsgSender<'a, P, M>, RKMsgReceiver<'a, P, M>)
    {
        let q = ManuallyDrop::new(self);

        q.chan.state().refs = 2;

        (
            RKMsgSender {
                chan: q.chan.share()
            },
            RKMsgReceiver {
                chan: q.chan.share()
            }
        )
    }
}

impl<P: RKPort, M> Drop for RKMsgQueue<'_, P, M>
{
    fn drop(&mut self)
    {
        self.chan.release();
    }
}

impl<'a, P: RKPort> RKKernel<'a, P>
{
    /// Creates a message queue on this kernel's heap.
    /// * Same as [`RKMsgQueue::new`].
    pub fn msgq<M>(&'a self, len: usize) -> Result<RKMsgQueue<'a, P, M>, RKError>
    {
        RKMsgQueue::new(self, len)
    }
}

//

/// Message sending channel
pub struct RKMsgSender<'a, P: RKPort, M>
{
    chan: Chan<'a, P, M>
}

unsafe impl<P: RKPort, M: Send> Send for RKMsgSender<'_, P, M> {}

impl<P: RKPort, M> RKMsgSender<'_, P, M>
{
    /// Gets if there is a vacant message entry.
    /// * Returns the number of vacant message entries.
    pub fn vacant(&self) -> usize
    {
        let k = self.chan.k;
        let s = self.chan.state();

        k.cs(|| {
            s.wr_pid = k.current();

            wrap_diff(s.rd_idx, wrap_inc(s.wr_idx, s.mem.len()), s.mem.len())
        })
    }

    /// Sends a message.
    /// * `msg` - the message to be sent.
    /// * Blocks if there is no vacant message entry.
    pub fn send(&mut self, msg: M)
    {
        let k = self.chan.k;
        let s = self.chan.state();

        let curr_wr_idx = k.cs(|| {
            s.wr_pid = k.current();
            s.wr_idx
        });
        let next_wr_idx = wrap_inc(curr_wr_idx, s.mem.len());

        while k.cs(|| s.rd_idx) == next_wr_idx {
            k.sig_wait(SIG_SYSTEM6);
        }

        s.mem.write(curr_wr_idx, Some(msg));

        let rd_pid = k.cs(|| {
            s.wr_idx = next_wr_idx;
            s.rd_pid
        });

        if let Some(rd_pid) = rd_pid {
            k.sig_post(rd_pid, SIG_SYSTEM5);
        }
    }
}

impl<P: RKPort, M> Drop for RKMsgSender<'_, P, M>
{
    fn drop(&mut self)
    {
        self.chan.release();
    }
}

//

/// Message receiving channel
pub struct RKMsgReceiver<'a, P: RKPort, M>
{
    chan: Chan<'a, P, M>
}

unsafe impl<P: RKPort, M: Send> Send for RKMsgReceiver<'_, P, M> {}

impl<P: RKPort, M> RKMsgReceiver<'_, P, M>
{
    /// Gets if there is an available message entry.
    /// * Returns the number of available message entries.
    pub fn available(&self) -> usize
    {
        let k = self.chan.k;
        let s = self.chan.state();

        k.cs(|| {
            s.rd_pid = k.current();

            wrap_diff(s.wr_idx, s.rd_idx, s.mem.len())
        })
    }

    /// Receives a message.
    /// * Returns the oldest message.
    /// * Blocks if there is no available message entry.
    pub fn receive(&mut self) -> M
    {
        let k = self.chan.k;
        let s = self.chan.state();

        let curr_rd_idx = k.cs(|| {
            s.rd_pid = k.current();
            s.rd_idx
        });
        let next_rd_idx = wrap_inc(curr_rd_idx, s.mem.len());

        while k.cs(|| s.wr_idx) == curr_rd_idx {
            k.sig_wait(SIG_SYSTEM5);
        }

        let msg = s.mem.refer(curr_rd_idx).take().bk_unwrap();

        let wr_pid = k.cs(|| {
            s.rd_idx = next_rd_idx;
            s.wr_pid
        });

        if let Some(wr_pid) = wr_pid {
            k.sig_post(wr_pid, SIG_SYSTEM6);
        }

        msg
    }
}

impl<P: RKPort, M> Drop for RKMsgReceiver<'_, P, M>
{
    fn drop(&mut self)
    {
        self.chan.release();
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn ring_arithmetic()
    {
        assert_eq!(wrap_inc(2, 4), 3);
        assert_eq!(wrap_inc(3, 4), 0);

        assert_eq!(wrap_diff(3, 1, 4), 2);
        assert_eq!(wrap_diff(1, 3, 4), 2);
        assert_eq!(wrap_diff(2, 2, 4), 0);
    }
}
