#![allow(dead_code)]

use busway::{AddressPolicy, Bus, BusError, BusTraits, Handler, HandlerPolicy, testing::CallLog};
use parking_lot::Mutex;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicU32, Ordering},
};

// ============================================================================
// Test Bus Definitions
// ============================================================================

pub trait NodeEvents: Send + Sync {
    fn notify(&self);
    fn answer(&self) -> u32;
}

/// Addressed by name, many handlers per address.
pub struct NamedBus;

impl BusTraits for NamedBus {
    type Interface = dyn NodeEvents;
    type Id = String;
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;

    fn name() -> &'static str {
        "NamedBus"
    }
}

/// Addressed by name, one handler per address.
pub struct ExclusiveBus;

impl BusTraits for ExclusiveBus {
    type Interface = dyn NodeEvents;
    type Id = String;
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Single;
}

/// One address, many handlers.
pub struct SignalBus;

impl BusTraits for SignalBus {
    type Interface = dyn NodeEvents;
    type Id = ();
}

/// One address, one handler.
pub struct ServiceBus;

impl BusTraits for ServiceBus {
    type Interface = dyn NodeEvents;
    type Id = ();
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Single;
}

// ============================================================================
// Test Handlers
// ============================================================================

pub type Action = Box<dyn FnOnce(&Node) + Send>;

/// A handler that logs its name, counts its calls and can run a one-shot
/// action from inside its next invocation.
pub struct Node {
    pub name: &'static str,
    pub calls: AtomicU32,
    answer: u32,
    log: CallLog<&'static str>,
    action: Mutex<Option<Action>>,
    handler: Box<dyn NodeConnection>,
}

/// Type-erased access to a node's connection so one node type serves every
/// test bus.
pub trait NodeConnection: Send + Sync {
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
}

impl<B: BusTraits> NodeConnection for Handler<B> {
    fn disconnect(&self) {
        Handler::disconnect(self).expect("node was connected");
    }

    fn is_connected(&self) -> bool {
        Handler::is_connected(self)
    }
}

impl Node {
    /// Run `action` during the next invocation of this node.
    pub fn on_next_call(&self, action: impl FnOnce(&Node) + Send + 'static) {
        *self.action.lock() = Some(Box::new(action));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn disconnect(&self) {
        self.handler.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.handler.is_connected()
    }
}

impl NodeEvents for Node {
    fn notify(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(self.name);
        let action = self.action.lock().take();
        if let Some(action) = action {
            action(self);
        }
    }

    fn answer(&self) -> u32 {
        self.answer
    }
}

/// Create a node answering `answer` and try to connect it at `id`.
pub fn try_node<B>(
    bus: &Bus<B>,
    name: &'static str,
    answer: u32,
    id: B::Id,
    log: &CallLog<&'static str>,
) -> Result<Arc<Node>, BusError>
where
    B: BusTraits<Interface = dyn NodeEvents>,
{
    let mut outcome = Ok(());
    let node = Arc::new_cyclic(|me: &Weak<Node>| {
        let handler = Handler::new(bus, me.clone() as Weak<dyn NodeEvents>);
        outcome = handler.connect(id);
        Node {
            name,
            calls: AtomicU32::new(0),
            answer,
            log: log.clone(),
            action: Mutex::new(None),
            handler: Box::new(handler),
        }
    });
    outcome.map(|()| node)
}

/// Create a node and connect it at `id`.
pub fn node<B>(bus: &Bus<B>, name: &'static str, id: B::Id, log: &CallLog<&'static str>) -> Arc<Node>
where
    B: BusTraits<Interface = dyn NodeEvents>,
{
    try_node(bus, name, 0, id, log).expect("fresh handler connects")
}

/// Like [`node`], answering `answer` to result queries.
pub fn answering<B>(
    bus: &Bus<B>,
    name: &'static str,
    answer: u32,
    id: B::Id,
    log: &CallLog<&'static str>,
) -> Arc<Node>
where
    B: BusTraits<Interface = dyn NodeEvents>,
{
    try_node(bus, name, answer, id, log).expect("fresh handler connects")
}

pub fn id(name: &str) -> String {
    name.to_string()
}
