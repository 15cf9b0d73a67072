//! Hosted port: runs the kernel on a desktop OS.
//!
//! Every process is backed by a host thread, but a baton makes sure only the
//! thread of the running process makes progress: `switch_context` hands the
//! baton over and parks the caller until it gets it back.
//!
//! "Interrupts disabled" is modelled by a holder slot. A thread standing in
//! for an interrupt (for example one calling `RKKernel::tick` periodically)
//! has to become the holder before it can enter the kernel, so it cannot
//! interleave with a critical section of the running process. Code outside
//! critical sections may overlap with such a thread, just like it may be
//! interrupted on a real CPU.
//!
//! A host thread cannot be stopped at an arbitrary instruction. A preemption
//! requested by an interrupt stays pending until the thread of the
//! interrupted process next enters the port, which any kernel call does
//! (reading the tick count included). A process that never calls into the
//! kernel keeps the CPU; this is the one difference from a target port.
//!
//! The stack region handed to `init_context` is not used by the host thread,
//! which gets its own stack of `HOST_STACK_SIZE` bytes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use super::{RKPort, RKBootFn};

/// Stack size of a host thread backing a process.
pub const HOST_STACK_SIZE: usize = 256 * 1024;

const IDLE_NAP: Duration = Duration::from_micros(50);

//

#[derive(Clone, Copy)]
struct Preempt
{
    from: ThreadId,
    from_key: usize,
    to: ThreadId,
    to_key: usize
}

struct CpuState
{
    running: usize,
    holder: Option<ThreadId>,
    preempt: Option<Preempt>,
    next_key: usize,
    crashed: bool
}

struct HostCpu
{
    st: Mutex<CpuState>,
    cv: Condvar
}

impl HostCpu
{
    fn lock(&self) -> MutexGuard<'_, CpuState>
    {
        self.st.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'g>(&self, st: MutexGuard<'g, CpuState>) -> MutexGuard<'g, CpuState>
    {
        if st.crashed {
            drop(st);
            panic!("rtkern: a process thread panicked");
        }

        self.cv.wait(st).unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire<'g>(&self, mut st: MutexGuard<'g, CpuState>, me: ThreadId) -> MutexGuard<'g, CpuState>
    {
        while st.holder.is_some() {
            st = self.wait(st);
        }
        st.holder = Some(me);
        st
    }
}

//

/// Saved state of a process on the hosted port
pub struct HostContext
{
    key: usize,
    thread: ThreadId,
    _join: Option<JoinHandle<()>>
}

/// Port running processes on host threads
pub struct HostPort
{
    cpu: Arc<HostCpu>
}

impl HostPort
{
    /// Creates the port. The calling thread is the CPU's current context and
    /// becomes the main process once handed to `RKKernel::create`.
    pub fn new() -> HostPort
    {
        HostPort {
            cpu: Arc::new(HostCpu {
                st: Mutex::new(CpuState {
                    running: 0,
                    holder: None,
                    preempt: None,
                    next_key: 0,
                    crashed: false
                }),
                cv: Condvar::new()
            })
        }
    }
}

impl Default for HostPort
{
    fn default() -> Self
    {
        HostPort::new()
    }
}

unsafe impl RKPort for HostPort
{
    type Context = HostContext;
    type IrqState = bool;

    fn main_context(&self) -> HostContext
    {
        HostContext {
            key: 0,
            thread: thread::current().id(),
            _join: None
        }
    }

    unsafe fn init_context(&self, _stack: *mut u8, _stack_len: usize, boot: RKBootFn, data: *mut u8)
        -> Option<HostContext>
    {
        let key = {
            let mut st = self.cpu.lock();
            st.next_key += 1;
            st.next_key
        };

        let cpu = self.cpu.clone();
        let data = data as usize;

        let spawned = thread::Builder::new()
            .name(format!("rtkern-proc-{}", key))
            .stack_size(HOST_STACK_SIZE)
            .spawn(move || {
                {
                    let mut st = cpu.lock();
                    while st.running != key {
                        st = cpu.wait(st);
                    }
                }

                let run = panic::catch_unwind(AssertUnwindSafe(|| unsafe { boot(data as *mut u8) }));

                if run.is_err() {
                    cpu.lock().crashed = true;
                    cpu.cv.notify_all();
                }
            });

        match spawned {
            Ok(join) => Some(HostContext {
                key,
                thread: join.thread().id(),
                _join: Some(join)
            }),
            Err(e) => {
                log::warn!("hosted: cannot spawn process thread: {}", e);
                None
            }
        }
    }

    unsafe fn switch_context(&self, from: *mut HostContext, to: *const HostContext)
    {
        let from_key = (*from).key;

        let mut st = self.cpu.lock();
        st.running = (*to).key;
        st.holder = Some((*to).thread);
        self.cpu.cv.notify_all();

        while st.running != from_key {
            st = self.cpu.wait(st);
        }
    }

    unsafe fn exit_context(&self, to: *const HostContext)
    {
        let mut st = self.cpu.lock();
        st.running = (*to).key;
        st.holder = Some((*to).thread);
        self.cpu.cv.notify_all();
    }

    fn irq_save_disable(&self) -> bool
    {
        let me = thread::current().id();
        let st = self.cpu.lock();

        if st.holder == Some(me) {
            return false;
        }

        let mut st = self.cpu.acquire(st, me);

        // an interrupt took the CPU from this process meanwhile
        if let Some(pre) = st.preempt.filter(|pre| pre.from == me) {
            st.preempt = None;
            st.running = pre.to_key;
            st.holder = Some(pre.to);
            self.cpu.cv.notify_all();

            while st.running != pre.from_key {
                st = self.cpu.wait(st);
            }
        }

        true
    }

    fn irq_restore(&self, was_enabled: bool)
    {
        if was_enabled {
            self.irq_enable();
        }
    }

    fn irq_enable(&self)
    {
        let me = thread::current().id();
        let mut st = self.cpu.lock();

        if st.holder == Some(me) {
            st.holder = None;
            self.cpu.cv.notify_all();
        }
    }

    fn irq_enabled(&self) -> bool
    {
        self.cpu.lock().holder != Some(thread::current().id())
    }

    fn idle(&self)
    {
        let me = thread::current().id();

        self.irq_enable();
        thread::sleep(IDLE_NAP);

        let st = self.cpu.lock();
        self.cpu.acquire(st, me);
    }

    const PREEMPTIVE: bool = true;

    unsafe fn request_preempt(&self, from: *mut HostContext, to: *const HostContext)
    {
        let mut st = self.cpu.lock();

        st.preempt = Some(match st.preempt {
            Some(pre) => Preempt {
                to: (*to).thread,
                to_key: (*to).key,
                ..pre
            },
            None => Preempt {
                from: (*from).thread,
                from_key: (*from).key,
                to: (*to).thread,
                to_key: (*to).key
            }
        });
    }
}
