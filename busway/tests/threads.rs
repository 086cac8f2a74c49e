//! Cross-thread serialization and the process-wide bus contexts.

mod common;

use busway::{Bus, BusTraits, Handler, testing::CallLog};
use common::{NodeEvents, SignalBus, node};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Fails if two threads are ever inside `notify` at once.
struct Exclusive {
    inside: AtomicBool,
    overlaps: AtomicUsize,
    calls: AtomicUsize,
}

impl NodeEvents for Exclusive {
    fn notify(&self) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(50));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inside.store(false, Ordering::SeqCst);
    }

    fn answer(&self) -> u32 {
        0
    }
}

#[test]
fn test_dispatch_is_serialized_across_threads() {
    const THREADS: usize = 4;
    const EVENTS: usize = 50;

    let bus = Bus::<SignalBus>::new();
    let exclusive = Arc::new(Exclusive {
        inside: AtomicBool::new(false),
        overlaps: AtomicUsize::new(0),
        calls: AtomicUsize::new(0),
    });
    let target: Arc<dyn NodeEvents> = exclusive.clone();
    let handler = Handler::from_arc(&bus, &target);
    handler.connect_default().unwrap();

    let barrier = Barrier::new(THREADS);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                for _ in 0..EVENTS {
                    bus.broadcast(|h| h.notify());
                }
            });
        }
    });

    assert_eq!(exclusive.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(exclusive.calls.load(Ordering::SeqCst), THREADS * EVENTS);
}

#[test]
fn test_connect_from_other_threads_during_dispatch() {
    let bus = Bus::<SignalBus>::new();
    let log = CallLog::new();
    let kept = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    kept.lock().push(node(&bus, "n", (), &log));
                    bus.broadcast(|h| h.notify());
                }
            });
        }
    });

    assert_eq!(bus.total_handlers(), 100);
    assert!(!bus.is_in_dispatch());
    // Every broadcast reached every handler connected before it started.
    assert!(log.len() >= 100);
}

#[test]
fn test_other_thread_sees_dispatch_but_not_as_its_own() {
    let bus = Bus::<SignalBus>::new();
    let log = CallLog::new();
    let probe = node(&bus, "probe", (), &log);
    let observed = Arc::new(Mutex::new(None));

    let (inner_bus, inner_observed) = (bus.clone(), Arc::clone(&observed));
    probe.on_next_call(move |_| {
        let bus = inner_bus.clone();
        let seen = thread::spawn(move || (bus.is_in_dispatch(), bus.is_in_dispatch_this_thread()))
            .join()
            .unwrap();
        *inner_observed.lock() = Some(seen);
    });

    bus.broadcast(|h| h.notify());
    assert_eq!(*observed.lock(), Some((true, false)));
}

// ============================================================================
// Global contexts
// ============================================================================

pub struct TelemetryBus;

impl BusTraits for TelemetryBus {
    type Interface = dyn NodeEvents;
    type Id = ();

    fn name() -> &'static str {
        "TelemetryBus"
    }
}

lazy_static! {
    static ref TELEMETRY_LOG: CallLog<&'static str> = CallLog::new();
}

#[test]
fn test_global_context_is_shared_between_threads() {
    let sink = node(&Bus::<TelemetryBus>::global(), "sink", (), &TELEMETRY_LOG);

    thread::spawn(|| Bus::<TelemetryBus>::global().broadcast(|h| h.notify()))
        .join()
        .unwrap();

    assert_eq!(TELEMETRY_LOG.take(), ["sink"]);
    assert_eq!(Bus::<TelemetryBus>::global().name(), "TelemetryBus");
    drop(sink);
    assert!(!Bus::<TelemetryBus>::global().has_handlers());
}
