#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rtkern::{RKKernel, RKConfig, RKProcState};
use rtkern::port::hosted::HostPort;

pub type Kernel<'a> = RKKernel<'a, HostPort>;

/// Period of the stand-in timer interrupt.
pub const TICK: Duration = Duration::from_millis(1);

/// Stack bytes for test processes, accounted in the kernel heap.
pub const STACK: usize = 1024;

pub fn cooperative() -> RKConfig
{
    RKConfig {
        preempt: false,
        ..RKConfig::default()
    }
}

struct StopOnDrop<'s>(&'s AtomicBool);

impl Drop for StopOnDrop<'_>
{
    fn drop(&mut self)
    {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Runs `f` in the calling process while a host thread calls `tick` every
/// `TICK`, like a periodic timer interrupt would.
pub fn with_ticker<'a, R, F>(k: &'a Kernel<'a>, f: F) -> R
where F: FnOnce() -> R
{
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(TICK);
                k.tick();
            }
        });

        let _stop = StopOnDrop(&stop);
        f()
    })
}

/// Polls from a host thread until process `pid` is in `state`.
pub fn wait_state(k: &Kernel<'_>, pid: u16, state: RKProcState)
{
    while k.proc_state(pid) != state {
        thread::sleep(Duration::from_micros(200));
    }
}
