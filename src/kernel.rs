use core::cell::UnsafeCell;
use core::fmt;
use core::mem::{size_of, align_of};
use core::ptr::{self, NonNull};

use crate::{RKProcId, RKPri, RKSigMask, RKTicks};
use crate::memory::{RKMemBlk, RKAlloc, RKRawArray, align_down};
use crate::heap::RKHeap;
use crate::prilist::{PriList, PriLink, PriNodes};
use crate::port::RKPort;
use crate::sem::SemInner;
use crate::bk_assert;
use crate::bkptpanic::BKUnwrap;

//

/// Bytes a process stack needs besides its startup record.
const MIN_STACK: usize = 32 * size_of::<usize>();

/// Kernel configuration given to `RKKernel::create`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RKConfig
{
    /// Lets the tick rotate equal priorities and a higher priority process
    /// readied by an interrupt take over when the interrupt returns.
    pub preempt: bool,
    /// Ticks a process may run before an equal priority process gets the CPU.
    pub quantum: u32,
    /// Boosts a semaphore owner to the priority of its highest waiter.
    pub pri_inherit: bool
}

impl Default for RKConfig
{
    fn default() -> Self
    {
        RKConfig {
            preempt: true,
            quantum: 10,
            pri_inherit: true
        }
    }
}

/// Recoverable kernel errors
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RKError
{
    /// Every slot of the process table is in use.
    NoProcSlot,
    /// The kernel heap has no chunk large enough.
    NoMemory,
    /// The stack cannot hold the startup record and a minimal frame.
    StackTooSmall,
    /// The port could not create a context.
    NoContext
}

impl fmt::Display for RKError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RKError::NoProcSlot => write!(f, "no free process slot"),
            RKError::NoMemory => write!(f, "kernel heap exhausted"),
            RKError::StackTooSmall => write!(f, "stack too small"),
            RKError::NoContext => write!(f, "port cannot create a context")
        }
    }
}

/// State of a process slot
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RKProcState
{
    /// Unused slot.
    Free,
    /// Queued, waiting for the CPU.
    Ready,
    /// Owns the CPU.
    Running,
    /// Waiting on signals or on a semaphore.
    Blocked,
    /// Returned from its entry; the slot is freed once it is off the CPU.
    Zombie
}

/// Queue a process is linked into
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum RKQueue
{
    None,
    Ready,
    Sem(*mut SemInner)
}

//

pub(crate) struct RKProc<C>
{
    pub(crate) state: RKProcState,
    pub(crate) base_pri: RKPri,
    pub(crate) pri: RKPri,
    link: PriLink<RKProcId>,
    pub(crate) queue: RKQueue,
    pub(crate) sig_wait: RKSigMask,
    pub(crate) sig_recv: RKSigMask,
    pub(crate) timer: Option<(RKTicks, RKSigMask)>,
    pub(crate) forbid: u16,
    pub(crate) held: u16,
    stack: *mut u8,
    stack_len: usize,
    stack_owned: bool,
    ctx: Option<C>
}

impl<C> RKProc<C>
{
    fn new() -> RKProc<C>
    {
        RKProc {
            state: RKProcState::Free,
            base_pri: 0,
            pri: 0,
            link: PriLink::new(),
            queue: RKQueue::None,
            sig_wait: 0,
            sig_recv: 0,
            timer: None,
            forbid: 0,
            held: 0,
            stack: ptr::null_mut(),
            stack_len: 0,
            stack_owned: false,
            ctx: None
        }
    }

    fn is_alive(&self) -> bool
    {
        matches!(self.state, RKProcState::Ready | RKProcState::Running | RKProcState::Blocked)
    }
}

impl<C> PriNodes<RKProcId> for RKRawArray<RKProc<C>>
{
    fn pri(&self, i: RKProcId) -> RKPri
    {
        self.refer(i).pri
    }

    fn link(&mut self, i: RKProcId) -> &mut PriLink<RKProcId>
    {
        &mut self.refer(i).link
    }
}

//

pub(crate) struct KernState<C>
{
    pub(crate) procs: RKRawArray<RKProc<C>>,
    pub(crate) ready: PriList<RKProcId>,
    pub(crate) current: Option<RKProcId>,
    pub(crate) ticks: RKTicks,
    quantum_left: u32,
    pub(crate) in_isr: u8
}

impl<C> KernState<C>
{
    pub(crate) fn cur(&self) -> RKProcId
    {
        self.current.bk_unwrap()
    }

    pub(crate) fn proc(&self, pid: RKProcId) -> &mut RKProc<C>
    {
        bk_assert!((pid as usize) < self.procs.len(),
                   "pid {}: out of process table", pid);

        self.procs.refer(pid)
    }

    pub(crate) fn make_ready(&mut self, pid: RKProcId, head: bool)
    {
        let p = self.procs.refer(pid);
        p.state = RKProcState::Ready;
        p.queue = RKQueue::Ready;

        if head {
            self.ready.enqueue_head(&mut self.procs, pid);
        }
        else {
            self.ready.enqueue_tail(&mut self.procs, pid);
        }
    }

    fn free_slot(&self) -> Option<RKProcId>
    {
        (1..self.procs.len())
            .find(|&i| self.procs.refer(i).state == RKProcState::Free)
            .map(|i| i as RKProcId)
    }
}

//

struct Boot<T>
{
    kern: *const (),
    f: T
}

unsafe extern "C-unwind" fn boot<P, T>(data: *mut u8)
where P: RKPort, T: FnOnce()
{
    let Boot { kern, f } = ptr::read(data as *mut Boot<T>);
    let kern = &*(kern as *const RKKernel<'_, P>);

    kern.port.irq_enable();

    f();

    kern.exit_current();
}

//

/// Kernel instance
///
/// Lives inside the memory block given to [`create`](Self::create), together
/// with the process table and the kernel heap.
pub struct RKKernel<'a, P: RKPort>
{
    pub(crate) port: P,
    pub(crate) config: RKConfig,
    st: UnsafeCell<KernState<P::Context>>,
    heap: UnsafeCell<RKHeap<'a>>
}

// state is only touched with interrupts disabled
unsafe impl<P: RKPort> Sync for RKKernel<'_, P> {}

impl<'a, P: RKPort> RKKernel<'a, P>
{
    // ----- ----- Main context ----- ----- //

    /// Reserves a memory block to be used by a kernel instance.
    /// * Any type `B` specifies a size of the memory block. Typically use `[u8; N]` for `N` bytes.
    /// * Returns the reserved memory block.
    pub const fn mem<B>() -> RKMemBlk<B>
    {
        RKMemBlk::new()
    }

    /// Creates a kernel instance and makes the caller its main process.
    /// * `mem` - reserved memory block.
    /// * `num_procs` - number of processes that can exist besides the main process.
    /// * `config` - scheduling options.
    /// * `port` - CPU capability implementation.
    /// * Returns the created instance, placed in `mem`.
    /// * The kernel object and (`num_procs` + 1) process slots are carved from `mem`;
    ///   the rest becomes the kernel heap.
    /// * The main process has pid `0` and priority `0`.
    pub fn create<B>(mem: &'a mut RKMemBlk<B>, num_procs: RKProcId, config: RKConfig, port: P) -> &'a RKKernel<'a, P>
    {
        let mut alloc = RKAlloc::new(mem);

        let kern = alloc.one::<RKKernel<'a, P>>();
        let procs = alloc.array::<RKProc<P::Context>>(num_procs as usize + 1);
        let (heap_mem, heap_len) = alloc.rest(RKHeap::UNIT);

        for i in 0..procs.len() {
            procs.write(i, RKProc::new());
        }

        let main = procs.refer(0usize);
        main.state = RKProcState::Running;
        main.ctx = Some(port.main_context());

        let mut heap = RKHeap::new();
        unsafe {
            heap.init(heap_mem, heap_len);
        }

        log::debug!("kernel: {} process slots, {} bytes heap", procs.len(), heap.free_space());

        unsafe {
            kern.write(RKKernel {
                port,
                config,
                st: UnsafeCell::new(KernState {
                    procs,
                    ready: PriList::new(),
                    current: Some(0),
                    ticks: 0,
                    quantum_left: config.quantum,
                    in_isr: 0
                }),
                heap: UnsafeCell::new(heap)
            });

            &*kern
        }
    }

    // ----- ----- Process context ----- ----- //

    /// Spawns a closure as a process with a stack taken from the kernel heap.
    /// * `stack_size` - bytes of the stack.
    /// * `f: T` - process closure. The process terminates when it returns.
    /// * Returns the process identifier.
    /// * The process starts with priority `0` behind the ready processes of
    ///   the same priority. Its stack goes back to the heap after it terminates.
    pub fn spawn<T>(&'a self, stack_size: usize, f: T) -> Result<RKProcId, RKError>
    where T: FnOnce() + Send + 'a
    {
        if stack_size < Self::stack_need::<T>() {
            return Err(RKError::StackTooSmall);
        }

        let stack = match self.heap_alloc(stack_size) {
            Some(stack) => stack,
            None => {
                log::warn!("spawn: no {} bytes for a stack", stack_size);
                return Err(RKError::NoMemory);
            }
        };

        let r = self.start(stack.as_ptr(), stack_size, true, f);

        if r.is_err() {
            unsafe { self.heap_free(stack, stack_size); }
        }

        r
    }

    /// Spawns a closure as a process running on a caller-supplied stack.
    /// * `stack` - stack memory, kept borrowed by the kernel.
    /// * Otherwise same as [`spawn`](Self::spawn).
    pub fn spawn_with_stack<T>(&'a self, stack: &'a mut [usize], f: T) -> Result<RKProcId, RKError>
    where T: FnOnce() + Send + 'a
    {
        let stack_len = stack.len() * size_of::<usize>();

        if stack_len < Self::stack_need::<T>() {
            return Err(RKError::StackTooSmall);
        }

        self.start(stack.as_mut_ptr() as *mut u8, stack_len, false, f)
    }

    fn stack_need<T>() -> usize
    {
        size_of::<Boot<T>>() + align_of::<Boot<T>>() + MIN_STACK
    }

    fn start<T>(&'a self, stack: *mut u8, stack_len: usize, owned: bool, f: T) -> Result<RKProcId, RKError>
    where T: FnOnce() + Send + 'a
    {
        // startup record sits at the top of the stack
        let base = stack as usize;
        let rec = align_down(base + stack_len - size_of::<Boot<T>>(), align_of::<Boot<T>>());
        let data = rec as *mut Boot<T>;

        let pid = self.cs(|| {
            self.reap();

            let st = unsafe { self.st() };
            let pid = st.free_slot().ok_or(RKError::NoProcSlot)?;

            unsafe {
                data.write(Boot {
                    kern: self as *const Self as *const (),
                    f
                });
            }

            let ctx = unsafe { self.port.init_context(stack, rec - base, boot::<P, T>, data as *mut u8) };
            let ctx = match ctx {
                Some(ctx) => ctx,
                None => {
                    unsafe { ptr::drop_in_place(data); }
                    return Err(RKError::NoContext);
                }
            };

            let p = st.proc(pid);
            *p = RKProc::new();
            p.stack = stack;
            p.stack_len = stack_len;
            p.stack_owned = owned;
            p.ctx = Some(ctx);

            st.make_ready(pid, false);

            Ok(pid)
        })?;

        log::debug!("process {} spawned, {} bytes stack", pid, stack_len);

        self.preempt_point();

        Ok(pid)
    }

    fn exit_current(&self)
    {
        // never restored: the next process takes the CPU with interrupts disabled
        let _ = self.port.irq_save_disable();

        let st = unsafe { self.st() };
        let pid = st.cur();
        let p = st.proc(pid);

        bk_assert!(p.held == 0,
                   "process {} terminated holding a semaphore", pid);

        p.state = RKProcState::Zombie;
        p.timer = None;
        p.sig_wait = 0;
        p.forbid = 0;

        log::debug!("process {} terminated", pid);

        self.schedule();
    }

    /// Moves the running process behind the ready processes of the same
    /// priority and dispatches the highest priority ready process.
    pub fn yield_now(&self)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let cur = st.cur();

            st.make_ready(cur, false);
            self.schedule();
        });
    }

    /// Changes the base priority of a process.
    /// * `pid` - process identifier.
    /// * `pri` - new priority. The higher value is the higher priority.
    /// * The effective priority stays at least as high as an inherited one.
    ///   A queued process is moved to its new place in the queue.
    pub fn set_priority(&self, pid: RKProcId, pri: RKPri)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let p = st.proc(pid);

            bk_assert!(p.is_alive(), "process {} is not alive", pid);

            p.base_pri = pri;
            p.pri = self.effective_pri(pid);

            self.requeue(pid);
        });

        self.preempt_point();
    }

    /// Disables preemption of the running process until the matching `permit`.
    /// * Nests. Blocking while preemption is forbidden is fatal.
    pub fn forbid(&self)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            st.proc(st.cur()).forbid += 1;
        });
    }

    /// Re-enables preemption disabled by `forbid`.
    pub fn permit(&self)
    {
        self.cs(|| {
            let st = unsafe { self.st() };
            let p = st.proc(st.cur());

            bk_assert!(p.forbid > 0, "permit without forbid");
            p.forbid -= 1;
        });

        self.preempt_point();
    }

    /// Takes a pending preemption, if any.
    /// * A no-op with preemption disabled in `RKConfig`, with interrupts
    ///   disabled, inside `isr` and between `forbid` and `permit`.
    pub fn preempt_point(&self)
    {
        if !self.config.preempt || !self.port.irq_enabled() {
            return;
        }

        self.cs(|| {
            let st = unsafe { self.st() };

            if st.in_isr > 0 {
                return;
            }

            if let Some(cur) = self.preempt_due() {
                log::trace!("process {} preempted", cur);

                st.make_ready(cur, false);
                self.schedule();
            }
        });
    }

    /// Runs `f` on the kernel heap with preemption forbidden.
    /// * `f` must not call back into the kernel.
    pub fn with_heap<R, F>(&self, f: F) -> R
    where F: FnOnce(&mut RKHeap<'a>) -> R
    {
        self.forbid();

        let r = f(unsafe { self.heap() });

        self.permit();

        r
    }

    /// Gets free bytes of the kernel heap, after releasing stacks of
    /// terminated processes.
    pub fn free_space(&self) -> usize
    {
        self.cs(|| {
            self.reap();
            unsafe { self.heap() }.free_space()
        })
    }

    // ----- ----- Interrupt context ----- ----- //

    /// Runs an interrupt handler body that uses the kernel.
    /// * Within `f`, `sig_post` only queues the woken process.
    /// * When the outermost `isr` ends and the interrupted process is due to
    ///   be preempted, the port switches away from it as soon as the handler
    ///   returns (see `RKPort::request_preempt`). Otherwise the switch waits
    ///   for the next preemption point.
    pub fn isr<R, F>(&self, f: F) -> R
    where F: FnOnce() -> R
    {
        let preemptible = P::PREEMPTIVE && self.port.irq_enabled();

        let irq = self.port.irq_save_disable();
        unsafe { self.st() }.in_isr += 1;

        let r = f();

        let st = unsafe { self.st() };
        st.in_isr -= 1;

        if preemptible && st.in_isr == 0 {
            self.preempt_on_return();
        }

        self.port.irq_restore(irq);

        r
    }

    /// Advances time by one tick. Call it from the periodic timer interrupt.
    /// * Fires expired timeouts and counts the quantum of the running process down.
    pub fn tick(&self)
    {
        self.isr(|| {
            let now = {
                let st = unsafe { self.st() };
                st.ticks = st.ticks.wrapping_add(1);
                st.ticks
            };

            let len = unsafe { self.st() }.procs.len();

            for i in 0..len {
                let pid = i as RKProcId;
                let p = unsafe { self.st() }.proc(pid);

                if let Some((expire, sigs)) = p.timer {
                    if (now.wrapping_sub(expire) as i32) >= 0 {
                        p.timer = None;
                        self.sig_deliver_post(pid, sigs);
                    }
                }
            }

            let st = unsafe { self.st() };
            if st.current.is_some() && st.quantum_left > 0 {
                st.quantum_left -= 1;
            }
        });
    }

    // ----- ----- Process and Interrupt context ----- ----- //

    /// Gets the process identifier of the running process if any.
    pub fn current(&self) -> Option<RKProcId>
    {
        self.cs(|| unsafe { self.st() }.current)
    }

    /// Gets the effective priority of a process, inheritance included.
    pub fn priority(&self, pid: RKProcId) -> RKPri
    {
        self.cs(|| unsafe { self.st() }.proc(pid).pri)
    }

    /// Gets the state of a process slot.
    pub fn proc_state(&self, pid: RKProcId) -> RKProcState
    {
        self.cs(|| unsafe { self.st() }.proc(pid).state)
    }

    /// Whether a process exists and has not terminated.
    pub fn is_alive(&self, pid: RKProcId) -> bool
    {
        self.cs(|| unsafe { self.st() }.proc(pid).is_alive())
    }

    /// Gets the number of ticks since creation, wrapping around.
    pub fn ticks(&self) -> RKTicks
    {
        self.cs(|| unsafe { self.st() }.ticks)
    }

    /// Gets the configuration the kernel was created with.
    pub fn config(&self) -> RKConfig
    {
        self.config
    }

    // ----- ----- Internals ----- ----- //

    /// # Safety
    /// Interrupts must be disabled. A reference must not be kept across a
    /// context switch or an idle wait.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn st(&self) -> &mut KernState<P::Context>
    {
        &mut *self.st.get()
    }

    #[allow(clippy::mut_from_ref)]
    unsafe fn heap(&self) -> &mut RKHeap<'a>
    {
        &mut *self.heap.get()
    }

    /// Runs `f` with interrupts disabled.
    pub(crate) fn cs<R, F>(&self, f: F) -> R
    where F: FnOnce() -> R
    {
        let irq = self.port.irq_save_disable();
        let r = f();
        self.port.irq_restore(irq);
        r
    }

    pub(crate) fn heap_alloc(&self, size: usize) -> Option<NonNull<u8>>
    {
        self.cs(|| {
            self.reap();
            unsafe { self.heap() }.alloc(size)
        })
    }

    /// # Safety
    /// Same as [`RKHeap::free`].
    pub(crate) unsafe fn heap_free(&self, ptr: NonNull<u8>, size: usize)
    {
        self.cs(|| self.heap().free(ptr, size));
    }

    pub(crate) fn assert_may_block(&self)
    {
        bk_assert!(self.port.irq_enabled(), "blocking with interrupts disabled");

        self.cs(|| {
            let st = unsafe { self.st() };

            bk_assert!(st.in_isr == 0, "blocking in interrupt context");
            bk_assert!(st.proc(st.cur()).forbid == 0, "blocking with preemption forbidden");
        });
    }

    /// Running process if it should give the CPU to the head of the ready
    /// queue: a higher priority one, or an equal one once the quantum is
    /// spent. Interrupts must be disabled.
    fn preempt_due(&self) -> Option<RKProcId>
    {
        if !self.config.preempt {
            return None;
        }

        let st = unsafe { self.st() };
        let cur = st.current?;
        let p = st.proc(cur);

        if p.forbid > 0 {
            return None;
        }

        let top = st.ready.head_pri(&st.procs)?;

        if top > p.pri || (st.quantum_left == 0 && top >= p.pri) {
            Some(cur)
        }
        else {
            None
        }
    }

    /// Hands the CPU over on the way out of the outermost interrupt handler.
    /// Interrupts must be disabled.
    fn preempt_on_return(&self)
    {
        let cur = match self.preempt_due() {
            Some(cur) => cur,
            None => return
        };

        let st = unsafe { self.st() };

        st.make_ready(cur, false);
        let next = st.ready.pop_head(&mut st.procs).bk_unwrap();

        log::trace!("process {} preempted by an interrupt, {} runs", cur, next);

        self.take_cpu(next);

        let from = st.proc(cur).ctx.as_mut().bk_unwrap() as *mut P::Context;
        let to = st.proc(next).ctx.as_ref().bk_unwrap() as *const P::Context;

        unsafe { self.port.request_preempt(from, to); }
    }

    /// Switches away from the running process, which has already been
    /// queued, blocked or terminated. Interrupts must be disabled.
    pub(crate) fn schedule(&self)
    {
        let prev = unsafe { self.st() }.cur();

        let next = loop {
            let st = unsafe { self.st() };

            if let Some(next) = st.ready.pop_head(&mut st.procs) {
                break next;
            }

            st.current = None;
            self.port.idle();
        };

        self.dispatch(prev, next);
    }

    /// Makes `next` the running process. Interrupts must be disabled.
    fn take_cpu(&self, next: RKProcId)
    {
        let st = unsafe { self.st() };

        st.current = Some(next);
        st.quantum_left = self.config.quantum;

        let n = st.proc(next);
        n.state = RKProcState::Running;
        n.queue = RKQueue::None;
    }

    fn dispatch(&self, prev: RKProcId, next: RKProcId)
    {
        self.take_cpu(next);

        let st = unsafe { self.st() };
        let n = st.proc(next);

        if next == prev {
            return;
        }

        log::trace!("switch {} -> {}", prev, next);

        let p = st.proc(prev);
        let to = n.ctx.as_ref().bk_unwrap() as *const P::Context;

        if p.state == RKProcState::Zombie {
            unsafe { self.port.exit_context(to); }
            return;
        }

        let from = p.ctx.as_mut().bk_unwrap() as *mut P::Context;
        unsafe { self.port.switch_context(from, to); }

        self.reap();
    }

    /// Makes a blocked process ready. It takes the CPU at once if its
    /// priority is not below the running one and preemption is not forbidden.
    /// Interrupts must be disabled.
    pub(crate) fn wakeup(&self, pid: RKProcId)
    {
        let st = unsafe { self.st() };
        let cur = st.cur();

        let takes_over = {
            let c = st.proc(cur);
            st.in_isr == 0 && c.forbid == 0 && st.proc(pid).pri >= c.pri
        };

        if takes_over {
            st.make_ready(cur, false);
            self.dispatch(cur, pid);
        }
        else {
            st.make_ready(pid, true);
        }
    }

    /// Re-sorts a process whose priority changed into the queue it occupies.
    /// Interrupts must be disabled.
    pub(crate) fn requeue(&self, pid: RKProcId)
    {
        let st = unsafe { self.st() };

        match st.proc(pid).queue {
            RKQueue::Ready => {
                st.ready.resort(&mut st.procs, pid);
            }
            RKQueue::Sem(s) => {
                let s = unsafe { &mut *s };
                s.wait.resort(&mut st.procs, pid);
                self.inherit(s);
            }
            RKQueue::None => {}
        }
    }

    /// Base priority of a process raised to the highest process waiting on
    /// any semaphore it holds. Interrupts must be disabled.
    pub(crate) fn effective_pri(&self, pid: RKProcId) -> RKPri
    {
        let st = unsafe { self.st() };
        let mut pri = st.proc(pid).base_pri;

        if !self.config.pri_inherit || st.proc(pid).held == 0 {
            return pri;
        }

        for i in 0..st.procs.len() {
            let w = st.procs.refer(i);

            if let RKQueue::Sem(s) = w.queue {
                // a waited-on semaphore is borrowed by its waiters
                if unsafe { (*s).owner } == Some(pid) {
                    pri = pri.max(w.pri);
                }
            }
        }

        pri
    }

    /// Brings the owner of `s` to its effective priority after the waiters
    /// of `s` changed, following the chain of owners blocked on further
    /// semaphores. Interrupts must be disabled.
    pub(crate) fn inherit(&self, s: &mut SemInner)
    {
        if !self.config.pri_inherit {
            return;
        }

        if let Some(owner) = s.owner {
            let pri = self.effective_pri(owner);
            let o = unsafe { self.st() }.proc(owner);

            if pri != o.pri {
                log::trace!("process {} runs at priority {}", owner, pri);

                o.pri = pri;
                self.requeue(owner);
            }
        }
    }

    /// Frees slots and heap stacks of terminated processes that are off the
    /// CPU. Interrupts must be disabled.
    fn reap(&self)
    {
        let st = unsafe { self.st() };

        for i in 0..st.procs.len() {
            let pid = i as RKProcId;
            let p = st.proc(pid);

            if p.state != RKProcState::Zombie || st.current == Some(pid) {
                continue;
            }

            p.ctx = None;

            if p.stack_owned {
                if let Some(stack) = NonNull::new(p.stack) {
                    unsafe { self.heap().free(stack, p.stack_len); }
                }
            }

            *p = RKProc::new();

            log::debug!("process {} reaped", pid);
        }
    }
}
