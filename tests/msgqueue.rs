mod common;

use std::sync::Arc;

use rtkern::*;
use rtkern::port::hosted::HostPort;

use common::{Kernel, STACK};

#[test]
fn messages_arrive_in_order()
{
    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 1, RKConfig::default(), HostPort::new());

    let before = k.free_space();

    let (mut tx, mut rx) = k.msgq::<u32>(4).unwrap().ch();

    // the producer outruns the consumer and blocks on a full queue
    let p = k.spawn(STACK, move || {
        for i in 0..100 {
            tx.send(i);
        }
    }).unwrap();
    k.set_priority(p, 1);

    assert_eq!(rx.available(), 4);

    for i in 0..100 {
        assert_eq!(rx.receive(), i);
    }

    assert!(!k.is_alive(p));
    assert_eq!(rx.available(), 0);

    drop(rx);
    assert_eq!(k.free_space(), before);
}

#[test]
fn receiver_blocks_until_a_message_comes()
{
    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 1, RKConfig::default(), HostPort::new());

    let (mut tx, mut rx) = k.msgq::<&'static str>(2).unwrap().ch();
    let (mut echo_tx, mut echo_rx) = k.msgq::<usize>(2).unwrap().ch();

    let p = k.spawn(STACK, move || {
        loop {
            let s = rx.receive();
            if s.is_empty() {
                break;
            }
            echo_tx.send(s.len());
        }
    }).unwrap();
    k.set_priority(p, 1);

    assert_eq!(k.proc_state(p), RKProcState::Blocked);

    for s in ["one", "three", "fifteen"] {
        tx.send(s);
        assert_eq!(echo_rx.available(), 1);
        assert_eq!(echo_rx.receive(), s.len());
    }

    tx.send("");
    assert!(!k.is_alive(p));
}

#[test]
fn counts_and_leftovers()
{
    let token = Arc::new(());

    let mut mem = Kernel::mem::<[u8; 8192]>();
    let k = RKKernel::create(&mut mem, 0, RKConfig::default(), HostPort::new());

    let before = k.free_space();

    let (mut tx, mut rx) = k.msgq::<Arc<()>>(2).unwrap().ch();
    assert!(k.free_space() < before);

    assert_eq!(tx.vacant(), 2);
    assert_eq!(rx.available(), 0);

    tx.send(token.clone());
    tx.send(token.clone());
    assert_eq!(tx.vacant(), 0);
    assert_eq!(rx.available(), 2);

    drop(rx.receive());
    assert_eq!(tx.vacant(), 1);

    tx.send(token.clone());
    assert_eq!(Arc::strong_count(&token), 3);

    // undelivered messages are dropped with the queue
    drop(tx);
    assert_eq!(Arc::strong_count(&token), 3);
    drop(rx);
    assert_eq!(Arc::strong_count(&token), 1);

    assert_eq!(k.free_space(), before);
}

#[test]
fn unsplit_queue_returns_its_memory()
{
    let mut mem = Kernel::mem::<[u8; 8192]>();
    let k = RKKernel::create(&mut mem, 0, RKConfig::default(), HostPort::new());

    let before = k.free_space();

    let q = RKMsgQueue::<_, u64>::new(k, 8).unwrap();
    assert!(k.free_space() <= before - 8 * 8);

    drop(q);
    assert_eq!(k.free_space(), before);

    assert!(matches!(k.msgq::<u64>(1 << 16), Err(RKError::NoMemory)));
}

#[test]
#[should_panic(expected = "message queue without entries")]
fn empty_queue_is_fatal()
{
    let mut mem = Kernel::mem::<[u8; 4096]>();
    let k = RKKernel::create(&mut mem, 0, RKConfig::default(), HostPort::new());

    let _ = k.msgq::<u8>(0);
}
