/*!
This crate for Rust provides `rtkern`, a small priority-scheduled real-time kernel
for single-core microcontrollers, with a hosted port to run and test it on a desktop OS.

# Target

**Single-core** systems of

* Cortex-M3  (`thumbv7m-none-eabi`)
* Cortex-M4 / M7  (`thumbv7em-none-eabi`)
* Cortex-M4 / M7 with FPU  (`thumbv7em-none-eabihf`)
* Cortex-M33 / M35P  (`thumbv8m.main-none-eabi`)
* Host OS threads (feature `std`, on by default)

Build with `default-features = false` for bare-metal targets.

# Features

* Processes
  * A process is a closure with its own stack, taken from the kernel heap or given by the caller.
  * Processes can be spawned at any time, also by other processes, and terminate by returning.
  * The caller of `RKKernel::create` becomes the main process.
* Priority-based dispatching
  * A higher priority process runs first. FIFO order among equal priorities.
  * Optional preemption: a timer tick counts a quantum down and rotates equal priorities,
    and an interrupt that readies a higher priority process switches to it on return.
  * `forbid` and `permit` mark sections that must not be preempted.
* Signals
  * Eight event bits per process; four are free for applications.
  * Synchronous `sig_send`, interrupt-safe `sig_post`, waits with timeout, `sleep`.
* Semaphores with priority inheritance
  * `RKSemaphore` and the data-owning `RKShared`.
* Message queues
  * `RKMsgQueue` with a sender and receiver pair.
* Static memory
  * `rtkern` doesn't require a global allocator but reserves a memory block in advance;
    a freelist heap inside it backs process stacks and message queues.

# Examples
## Usage Outline

```no_run
use rtkern::*;
use rtkern::port::hosted::HostPort;

let lock = RKSemaphore::new();

let mut mem = RKKernel::<HostPort>::mem::<[u8; 16384]>();
let k = RKKernel::create(&mut mem, 4, RKConfig::default(), HostPort::new());

let worker = k.spawn(1024, || {
    lock.obtain(k);
    // other codes...
    lock.release(k);

    k.sig_wait(SIG_USER0);
}).unwrap();

k.set_priority(worker, 2);
k.sig_send(worker, SIG_USER0);
```

A timer interrupt (or a host thread) drives time with `RKKernel::tick`.
See `demos/hosted.rs` for a complete program.
*/

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod bkptpanic;

mod memory;
mod prilist;

pub mod heap;
pub mod port;

mod kernel;
mod signal;
mod sem;
mod shared;
mod msgqueue;

/// Process identifier: index into the process table. `0` is the main process.
pub type RKProcId = u16;

/// Process priority. The higher value is the higher priority.
pub type RKPri = i16;

/// Set of signal bits.
pub type RKSigMask = u8;

/// Timer ticks.
pub type RKTicks = u32;

pub use crate::memory::RKMemBlk;
pub use crate::heap::RKHeap;
pub use crate::kernel::{RKKernel, RKConfig, RKError, RKProcState};
pub use crate::signal::{SIG_USER0, SIG_USER1, SIG_USER2, SIG_USER3};
pub use crate::signal::{SIG_TIMEOUT, SIG_SYSTEM5, SIG_SYSTEM6, SIG_SINGLE};
pub use crate::sem::RKSemaphore;
pub use crate::shared::{RKShared, RKSharedGuard};
pub use crate::msgqueue::{RKMsgQueue, RKMsgSender, RKMsgReceiver};
