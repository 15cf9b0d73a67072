mod common;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI16, Ordering};

use rtkern::*;
use rtkern::port::hosted::HostPort;

use common::{Kernel, STACK, with_ticker};

//

/// L holds the semaphore H wants while M, in between, is ready to run.
/// Returns the order H and M finish in, and the priority L ran at.
fn inversion(pri_inherit: bool) -> (Vec<char>, RKPri)
{
    let sem = RKSemaphore::new();
    let order = Mutex::new(Vec::new());
    let l_pri = AtomicI16::new(-1);

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let config = RKConfig {
        pri_inherit,
        ..RKConfig::default()
    };
    let k = RKKernel::create(&mut mem, 3, config, HostPort::new());

    k.set_priority(0, 10);

    let l = k.spawn(STACK, || {
        sem.obtain(k);
        k.sig_send(0, SIG_USER0);

        for _ in 0..3 {
            k.yield_now();
        }
        l_pri.store(k.priority(k.current().unwrap()), Ordering::SeqCst);

        sem.release(k);
    }).unwrap();
    k.set_priority(l, 1);

    // L owns the semaphore from here on
    k.sig_wait(SIG_USER0);
    assert_eq!(sem.owner(k), Some(l));

    let h = k.spawn(STACK, || {
        sem.obtain(k);
        order.lock().unwrap().push('H');
        sem.release(k);
        k.sig_post(0, SIG_USER1);
    }).unwrap();
    k.set_priority(h, 3);

    let m = k.spawn(STACK, || {
        for _ in 0..50 {
            k.yield_now();
        }
        order.lock().unwrap().push('M');
        k.sig_post(0, SIG_USER2);
    }).unwrap();
    k.set_priority(m, 2);

    let mut done = 0;
    while done != SIG_USER1 | SIG_USER2 {
        done |= k.sig_wait(SIG_USER1 | SIG_USER2);
    }

    // let the rest terminate
    k.set_priority(0, 0);
    assert!(!k.is_alive(l) && !k.is_alive(h) && !k.is_alive(m));

    let order = order.lock().unwrap().clone();
    (order, l_pri.load(Ordering::SeqCst))
}

#[test]
fn inheritance_bounds_priority_inversion()
{
    let (order, l_pri) = inversion(true);

    assert_eq!(order, ['H', 'M']);
    assert_eq!(l_pri, 3);
}

#[test]
fn without_inheritance_the_middle_runs_first()
{
    let (order, l_pri) = inversion(false);

    assert_eq!(order, ['M', 'H']);
    assert_eq!(l_pri, 1);
}

/// Spins for `n` ticks without giving the CPU away.
fn busy(k: &Kernel<'_>, n: RKTicks)
{
    let start = k.ticks();
    while k.ticks().wrapping_sub(start) < n {}
}

/// Same setup as `inversion`, but L and M burn CPU time instead of yielding
/// while the timer ticks.
fn busy_inversion(pri_inherit: bool) -> (Vec<char>, RKPri)
{
    let sem = RKSemaphore::new();
    let order = Mutex::new(Vec::new());
    let l_pri = AtomicI16::new(-1);

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let config = RKConfig {
        pri_inherit,
        ..RKConfig::default()
    };
    let k = RKKernel::create(&mut mem, 3, config, HostPort::new());

    k.set_priority(0, 10);

    with_ticker(k, || {
        let l = k.spawn(STACK, || {
            sem.obtain(k);
            k.sig_send(0, SIG_USER0);

            busy(k, 5);
            l_pri.store(k.priority(k.current().unwrap()), Ordering::SeqCst);

            sem.release(k);
        }).unwrap();
        k.set_priority(l, 1);

        k.sig_wait(SIG_USER0);

        let h = k.spawn(STACK, || {
            sem.obtain(k);
            order.lock().unwrap().push('H');
            sem.release(k);
            k.sig_post(0, SIG_USER1);
        }).unwrap();
        k.set_priority(h, 3);

        let m = k.spawn(STACK, || {
            busy(k, 20);
            order.lock().unwrap().push('M');
            k.sig_post(0, SIG_USER2);
        }).unwrap();
        k.set_priority(m, 2);

        let mut done = 0;
        while done != SIG_USER1 | SIG_USER2 {
            done |= k.sig_wait(SIG_USER1 | SIG_USER2);
        }

        k.set_priority(0, 0);
        assert!(!k.is_alive(l) && !k.is_alive(h) && !k.is_alive(m));
    });

    let order = order.lock().unwrap().clone();
    (order, l_pri.load(Ordering::SeqCst))
}

#[test]
fn inheritance_bounds_inversion_by_a_busy_middle()
{
    let (order, l_pri) = busy_inversion(true);

    assert_eq!(order, ['H', 'M']);
    assert_eq!(l_pri, 3);
}

#[test]
fn without_inheritance_a_busy_middle_runs_first()
{
    let (order, l_pri) = busy_inversion(false);

    assert_eq!(order, ['M', 'H']);
    assert_eq!(l_pri, 1);
}

#[test]
fn waiters_served_by_priority_then_arrival()
{
    let sem = RKSemaphore::new();
    let order = Mutex::new(Vec::new());

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let config = RKConfig {
        pri_inherit: false,
        ..RKConfig::default()
    };
    let k = RKKernel::create(&mut mem, 3, config, HostPort::new());

    k.set_priority(0, 10);
    sem.obtain(k);

    for (id, pri) in [(1_u8, 1), (2, 2), (3, 1)] {
        let (sem, order) = (&sem, &order);
        let pid = k.spawn(STACK, move || {
            sem.obtain(k);
            order.lock().unwrap().push(id);
            sem.release(k);
        }).unwrap();
        k.set_priority(pid, pri);
    }

    // everyone queues up behind main
    k.set_priority(0, 0);
    assert!(order.lock().unwrap().is_empty());

    sem.release(k);

    assert_eq!(*order.lock().unwrap(), [2, 1, 3]);
    assert!(!sem.is_locked(k));
}

#[test]
fn raising_a_waiter_resorts_the_queue()
{
    let sem = RKSemaphore::new();
    let order = Mutex::new(Vec::new());

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 3, RKConfig::default(), HostPort::new());

    sem.obtain(k);

    let mut pids = Vec::new();
    for id in 1..=3_u8 {
        let (sem, order) = (&sem, &order);
        let pid = k.spawn(STACK, move || {
            sem.obtain(k);
            order.lock().unwrap().push(id);
            sem.release(k);
        }).unwrap();

        // runs at once and blocks; main inherits its priority
        k.set_priority(pid, id as RKPri);
        assert_eq!(k.proc_state(pid), RKProcState::Blocked);
        assert_eq!(k.priority(0), id as RKPri);

        pids.push(pid);
    }

    k.set_priority(pids[0], 5);
    assert_eq!(k.priority(0), 5);

    sem.release(k);
    assert_eq!(k.priority(0), 0);

    assert_eq!(*order.lock().unwrap(), [1, 3, 2]);
}

#[test]
fn inheritance_passes_along_a_chain()
{
    let a = RKSemaphore::new();
    let b = RKSemaphore::new();

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 2, RKConfig::default(), HostPort::new());

    a.obtain(k);

    let p1 = k.spawn(STACK, || {
        b.obtain(k);
        a.obtain(k);
        a.release(k);
        b.release(k);
    }).unwrap();
    k.set_priority(p1, 1);
    assert_eq!(k.priority(0), 1);

    let p2 = k.spawn(STACK, || {
        b.obtain(k);
        b.release(k);
    }).unwrap();
    k.set_priority(p2, 4);

    // p2 waits on p1, which waits on main
    assert_eq!(k.priority(p1), 4);
    assert_eq!(k.priority(0), 4);

    a.release(k);

    assert_eq!(k.priority(0), 0);
    assert!(!k.is_alive(p1) && !k.is_alive(p2));
    assert!(!a.is_locked(k) && !b.is_locked(k));
}

#[test]
fn release_keeps_inheritance_of_other_semaphores()
{
    let s1 = RKSemaphore::new();
    let s2 = RKSemaphore::new();

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 2, RKConfig::default(), HostPort::new());

    s1.obtain(k);
    s2.obtain(k);

    let m = k.spawn(STACK, || {
        s2.obtain(k);
        s2.release(k);
    }).unwrap();
    k.set_priority(m, 3);

    let h = k.spawn(STACK, || {
        s1.obtain(k);
        s1.release(k);
    }).unwrap();
    k.set_priority(h, 5);

    assert_eq!(k.priority(0), 5);

    // H takes s1 and finishes; M still waits on s2
    s1.release(k);
    assert!(!k.is_alive(h));
    assert_eq!(k.proc_state(m), RKProcState::Blocked);
    assert_eq!(k.priority(0), 3);

    // lowering the waiter takes the boost back
    k.set_priority(m, 2);
    assert_eq!(k.priority(0), 2);

    s2.release(k);
    assert!(!k.is_alive(m));
    assert_eq!(k.priority(0), 0);
}

#[test]
fn attempt_never_blocks()
{
    let sem = RKSemaphore::new();
    let got = AtomicBool::new(true);

    let mut mem = Kernel::mem::<[u8; 8192]>();
    let k = RKKernel::create(&mut mem, 2, RKConfig::default(), HostPort::new());

    assert!(sem.attempt(k));
    assert_eq!(sem.owner(k), Some(0));

    let p = k.spawn(STACK, || {
        got.store(sem.attempt(k), Ordering::SeqCst);
    }).unwrap();
    k.set_priority(p, 1);

    assert!(!k.is_alive(p));
    assert!(!got.load(Ordering::SeqCst));

    sem.release(k);

    let q = k.spawn(STACK, || {
        if sem.attempt(k) {
            sem.release(k);
        }
        else {
            got.store(false, Ordering::SeqCst);
        }
    }).unwrap();
    got.store(true, Ordering::SeqCst);
    k.set_priority(q, 1);

    assert!(!k.is_alive(q));
    assert!(got.load(Ordering::SeqCst));
    assert!(!sem.is_locked(k));
}

#[test]
fn shared_counter_stays_consistent()
{
    let counter = RKShared::new(0_u32);

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 3, RKConfig::default(), HostPort::new());

    let sigs = [SIG_USER0, SIG_USER1, SIG_USER2];

    k.forbid();
    for &sig in &sigs {
        let counter = &counter;
        let pid = k.spawn(STACK, move || {
            for _ in 0..100 {
                let mut c = counter.lock(k);
                let v = *c;
                // others run and queue up on the lock meanwhile
                k.yield_now();
                *c = v + 1;
            }
            k.sig_post(0, sig);
        }).unwrap();
        k.set_priority(pid, 1);
    }
    k.permit();

    let mut done = 0;
    while done != SIG_USER0 | SIG_USER1 | SIG_USER2 {
        done |= k.sig_wait(SIG_USER0 | SIG_USER1 | SIG_USER2);
    }

    assert_eq!(*counter.lock(k), 300);
}

#[test]
fn try_lock_fails_while_held()
{
    let shared = RKShared::new(Vec::<u8>::new());
    let failed = AtomicBool::new(false);

    let mut mem = Kernel::mem::<[u8; 8192]>();
    let k = RKKernel::create(&mut mem, 1, RKConfig::default(), HostPort::new());

    let mut g = shared.lock(k);
    g.push(1);

    let p = k.spawn(STACK, || {
        failed.store(shared.try_lock(k).is_none(), Ordering::SeqCst);
    }).unwrap();
    k.set_priority(p, 1);

    assert!(failed.load(Ordering::SeqCst));
    drop(g);

    let mut g = shared.try_lock(k).unwrap();
    g.push(2);
    assert_eq!(*g, [1, 2]);
}

#[test]
#[should_panic(expected = "releases a semaphore it does not own")]
fn release_without_owning_is_fatal()
{
    let sem = RKSemaphore::new();

    let mut mem = Kernel::mem::<[u8; 4096]>();
    let k = RKKernel::create(&mut mem, 0, RKConfig::default(), HostPort::new());

    sem.release(k);
}

#[test]
#[should_panic(expected = "obtains a semaphore it owns")]
fn recursive_obtain_is_fatal()
{
    let sem = RKSemaphore::new();

    let mut mem = Kernel::mem::<[u8; 4096]>();
    let k = RKKernel::create(&mut mem, 0, RKConfig::default(), HostPort::new());

    sem.obtain(k);
    sem.obtain(k);
}
