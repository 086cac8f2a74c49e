//! Connection hooks: greeting handlers as they join and leave addresses.

use busway::{AddressPolicy, Bus, BusError, BusTraits, Handler, testing::CallLog};
use std::sync::{Arc, Weak};

pub trait GreeterEvents: Send + Sync {
    fn greet(&self, id: u32);
    fn farewell(&self, id: u32);
    fn ping(&self);
}

/// Sends `greet` to every handler as it connects and `farewell` as it
/// leaves.
pub struct GreeterBus;

impl BusTraits for GreeterBus {
    type Interface = dyn GreeterEvents;
    type Id = u32;
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;

    fn on_connect(handler: &dyn GreeterEvents, id: &u32) {
        handler.greet(*id);
    }

    fn on_disconnect(handler: &dyn GreeterEvents, id: &u32) {
        handler.farewell(*id);
    }
}

/// Records each call together with what the bus reports at that moment.
struct Greeter {
    bus: Bus<GreeterBus>,
    log: CallLog<String>,
}

impl GreeterEvents for Greeter {
    fn greet(&self, id: u32) {
        self.log.push(format!(
            "greet {id} current={:?} connected={}",
            self.bus.current_id(),
            self.bus.has_handlers_id(&id)
        ));
    }

    fn farewell(&self, id: u32) {
        self.log.push(format!(
            "farewell {id} current={:?} connected={}",
            self.bus.current_id(),
            self.bus.has_handlers_id(&id)
        ));
    }

    fn ping(&self) {
        self.log.push("ping".to_string());
    }
}

fn greeter(bus: &Bus<GreeterBus>, log: &CallLog<String>) -> Arc<dyn GreeterEvents> {
    Arc::new(Greeter {
        bus: bus.clone(),
        log: log.clone(),
    })
}

#[test]
fn test_hooks_run_on_connect_and_disconnect() {
    let bus = Bus::<GreeterBus>::new();
    let log = CallLog::new();
    let target = greeter(&bus, &log);
    let handler = Handler::from_arc(&bus, &target);

    handler.connect(1).unwrap();
    handler.connect(2).unwrap();
    bus.event(&1, |h| h.ping());
    handler.disconnect_id(&1).unwrap();
    drop(handler);

    assert_eq!(
        log.take(),
        [
            "greet 1 current=Some(1) connected=true",
            "greet 2 current=Some(2) connected=true",
            "ping",
            "farewell 1 current=Some(1) connected=true",
            "farewell 2 current=Some(2) connected=true",
        ]
    );
    assert!(!bus.has_handlers());
    assert!(!bus.is_in_dispatch_this_thread());
}

#[test]
fn test_rejected_calls_skip_hooks() {
    let bus = Bus::<GreeterBus>::new();
    let log = CallLog::new();
    let target = greeter(&bus, &log);
    let handler = Handler::from_arc(&bus, &target);

    handler.connect(1).unwrap();
    assert!(matches!(
        handler.connect(1),
        Err(BusError::AlreadyConnected { .. })
    ));
    assert!(matches!(
        handler.disconnect_id(&2),
        Err(BusError::NotConnected { .. })
    ));
    assert_eq!(log.take(), ["greet 1 current=Some(1) connected=true"]);
}

#[test]
fn test_hooks_skip_unreachable_handlers() {
    let bus = Bus::<GreeterBus>::new();
    let log = CallLog::<String>::new();
    let gone = Weak::<Greeter>::new() as Weak<dyn GreeterEvents>;
    let handler = Handler::new(&bus, gone);

    handler.connect(3).unwrap();
    handler.disconnect().unwrap();
    assert!(log.is_empty());
    assert!(!bus.has_address(&3));
}

#[test]
fn test_hook_may_reenter_the_bus() {
    let bus = Bus::<GreeterBus>::new();
    let log = CallLog::new();
    let first = greeter(&bus, &log);
    let first_handler = Handler::from_arc(&bus, &first);
    first_handler.connect(1).unwrap();
    log.take();

    // The second greeting triggers an event to everyone at the address,
    // the newcomer included.
    struct Announcer {
        bus: Bus<GreeterBus>,
        log: CallLog<String>,
    }

    impl GreeterEvents for Announcer {
        fn greet(&self, id: u32) {
            self.log.push("announce".to_string());
            self.bus.event(&id, |h| h.ping());
        }

        fn farewell(&self, _id: u32) {}

        fn ping(&self) {
            self.log.push("announcer ping".to_string());
        }
    }

    let second: Arc<dyn GreeterEvents> = Arc::new(Announcer {
        bus: bus.clone(),
        log: log.clone(),
    });
    let second_handler = Handler::from_arc(&bus, &second);
    second_handler.connect(1).unwrap();

    assert_eq!(log.take(), ["announce", "ping", "announcer ping"]);
}
