// Runnable on a desktop OS: cargo run --example hosted

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rtkern::*;
use rtkern::port::hosted::HostPort;

type Kernel<'a> = RKKernel<'a, HostPort>;

const LAST: u32 = 50;

//

struct StdoutLogger;

impl log::Log for StdoutLogger
{
    fn enabled(&self, _metadata: &log::Metadata) -> bool
    {
        true
    }

    fn log(&self, record: &log::Record)
    {
        if self.enabled(record.metadata()) {
            println!("[{:5}] {}:{}: {}",
                     record.level(),
                     record.file().unwrap_or("?"),
                     record.line().unwrap_or(0),
                     record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StdoutLogger = StdoutLogger;

//

fn main()
{
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(log::LevelFilter::Debug);

    let sh = RKShared::new(0_u32);
    let stop = AtomicBool::new(false);

    let mut mem = Kernel::mem::<[u8; 16384]>();
    let k = RKKernel::create(&mut mem, 3, RKConfig::default(), HostPort::new());

    let (snd, rcv) = k.msgq::<u32>(4).unwrap().ch();

    let t0 = k.spawn(1024, move || task0(k, snd)).unwrap();
    let t1 = k.spawn(1024, || task1(k, rcv, &sh)).unwrap();
    let t2 = k.spawn(1024, || task2(k, &sh)).unwrap();

    for t in [t0, t1, t2] {
        k.set_priority(t, 1);
    }

    // SysTick stand-in
    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
                k.tick();
            }
        });

        println!("rtkern run");
        k.sig_wait(SIG_USER0);
        println!("rtkern done at tick {}, {} bytes free", k.ticks(), k.free_space());

        stop.store(true, Ordering::SeqCst);
    });
}

fn task0(k: &Kernel<'_>, mut snd: RKMsgSender<'_, HostPort, u32>)
{
    for vsnd in 0..=LAST {
        k.sleep(1);

        println!("task0 send {}", vsnd);
        snd.send(vsnd);
    }
}

fn task1(k: &Kernel<'_>, mut rcv: RKMsgReceiver<'_, HostPort, u32>, sh: &RKShared<u32>)
{
    for i in 0..=LAST {
        let vrcv = rcv.receive();

        assert_eq!(i, vrcv);
        println!("task1 touch {}", vrcv);
        *sh.lock(k) = vrcv;
    }
}

fn task2(k: &Kernel<'_>, sh: &RKShared<u32>)
{
    let mut j = 0;

    while j < LAST {
        let vlook = *sh.lock(k);

        assert!(j <= vlook);
        j = vlook;

        k.sleep(2);
    }

    println!("task2 exit");
    k.sig_post(0, SIG_USER0);
}
