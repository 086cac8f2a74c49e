//! Random connect/disconnect/bind/dispatch sequences checked against a
//! plain model of the address table.

mod common;

use busway::{AddressPolicy, BoundAddress, Bus, BusTraits, testing::CallLog};
use common::{Node, NodeEvents, node};
use proptest::prelude::*;
use std::sync::Arc;

pub struct IdBus;

impl BusTraits for IdBus {
    type Interface = dyn NodeEvents;
    type Id = u32;
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
}

const IDS: u32 = 3;

#[derive(Debug, Clone)]
enum Op {
    Connect(u32),
    Disconnect(usize),
    Bind(u32),
    Unbind(usize),
    Event { id: u32, actor: usize, victim: usize },
    Broadcast,
    BroadcastReverse,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..IDS).prop_map(Op::Connect),
        2 => any::<usize>().prop_map(Op::Disconnect),
        1 => (0..IDS).prop_map(Op::Bind),
        1 => any::<usize>().prop_map(Op::Unbind),
        3 => (0..IDS, any::<usize>(), any::<usize>())
            .prop_map(|(id, actor, victim)| Op::Event { id, actor, victim }),
        1 => Just(Op::Broadcast),
        1 => Just(Op::BroadcastReverse),
    ]
}

struct Address {
    id: u32,
    refs: usize,
    handlers: Vec<&'static str>,
}

#[derive(Default)]
struct Model {
    table: Vec<Address>,
}

impl Model {
    fn find(&self, id: u32) -> Option<&Address> {
        self.table.iter().find(|a| a.id == id)
    }

    fn find_or_create(&mut self, id: u32) -> &mut Address {
        let position = match self.table.iter().position(|a| a.id == id) {
            Some(position) => position,
            None => {
                self.table.push(Address {
                    id,
                    refs: 0,
                    handlers: Vec::new(),
                });
                self.table.len() - 1
            }
        };
        &mut self.table[position]
    }

    fn remove_handler(&mut self, id: u32, name: &str) {
        if let Some(address) = self.table.iter_mut().find(|a| a.id == id) {
            address.handlers.retain(|h| *h != name);
        }
        self.erase_dead();
    }

    fn erase_dead(&mut self) {
        self.table.retain(|a| a.refs > 0 || !a.handlers.is_empty());
    }

    fn flattened(&self) -> Vec<&'static str> {
        self.table
            .iter()
            .flat_map(|a| a.handlers.iter().copied())
            .collect()
    }
}

/// Expected visits when `actor` removes `victim` during one forward pass.
fn expected_pass(mut handlers: Vec<&'static str>, actor: &str, victim: &str) -> Vec<&'static str> {
    let mut visited = Vec::new();
    let mut next = 0;
    while next < handlers.len() {
        let current = handlers[next];
        visited.push(current);
        next += 1;
        if current == actor {
            if let Some(removed) = handlers.iter().position(|h| *h == victim) {
                handlers.remove(removed);
                if removed < next {
                    next -= 1;
                }
            }
        }
    }
    visited
}

fn check_invariant(bus: &Bus<IdBus>, model: &Model) -> Result<(), TestCaseError> {
    for id in 0..IDS {
        let expected = model.find(id);
        let (refs, handlers) = (bus.address_refs(&id), bus.handler_count(&id));
        prop_assert_eq!(bus.has_address(&id), expected.is_some());
        prop_assert_eq!(bus.has_address(&id), refs > 0 || handlers > 0);
        prop_assert_eq!(handlers, expected.map_or(0, |a| a.handlers.len()));
        prop_assert_eq!(refs, expected.map_or(0, |a| a.refs));
    }
    prop_assert_eq!(bus.address_count(), model.table.len());
    Ok(())
}

proptest! {
    #[test]
    fn random_operations_match_model(ops in proptest::collection::vec(op(), 1..60)) {
        let bus = Bus::<IdBus>::new();
        let log = CallLog::new();
        let mut model = Model::default();
        let mut pool: Vec<(Arc<Node>, u32)> = Vec::new();
        let mut binds: Vec<(BoundAddress<IdBus>, u32)> = Vec::new();
        let mut created = 0usize;

        for op in ops {
            match op {
                Op::Connect(id) => {
                    let name: &'static str = Box::leak(format!("n{created}").into_boxed_str());
                    created += 1;
                    pool.push((node(&bus, name, id, &log), id));
                    model.find_or_create(id).handlers.push(name);
                }
                Op::Disconnect(index) => {
                    if !pool.is_empty() {
                        let (gone, id) = pool.remove(index % pool.len());
                        gone.disconnect();
                        model.remove_handler(id, gone.name);
                    }
                }
                Op::Bind(id) => {
                    binds.push((bus.bind(id), id));
                    model.find_or_create(id).refs += 1;
                }
                Op::Unbind(index) => {
                    if !binds.is_empty() {
                        let (bound, id) = binds.remove(index % binds.len());
                        drop(bound);
                        model.find_or_create(id).refs -= 1;
                        model.erase_dead();
                    }
                }
                Op::Event { id, actor, victim } => {
                    let handlers = model.find(id).map(|a| a.handlers.clone()).unwrap_or_default();
                    if handlers.is_empty() {
                        bus.event(&id, |h| h.notify());
                        prop_assert!(log.take().is_empty());
                        continue;
                    }

                    let actor = handlers[actor % handlers.len()];
                    let victim = handlers[victim % handlers.len()];
                    let victim_node = pool
                        .iter()
                        .find(|(n, _)| n.name == victim)
                        .map(|(n, _)| Arc::downgrade(n))
                        .expect("victim is pooled");
                    if let Some((actor_node, _)) = pool.iter().find(|(n, _)| n.name == actor) {
                        actor_node.on_next_call(move |_| {
                            if let Some(victim) = victim_node.upgrade() {
                                victim.disconnect();
                            }
                        });
                    }

                    bus.event(&id, |h| h.notify());
                    prop_assert_eq!(log.take(), expected_pass(handlers, actor, victim));

                    pool.retain(|(n, _)| n.name != victim);
                    model.remove_handler(id, victim);
                }
                Op::Broadcast => {
                    bus.broadcast(|h| h.notify());
                    prop_assert_eq!(log.take(), model.flattened());
                }
                Op::BroadcastReverse => {
                    bus.broadcast_reverse(|h| h.notify());
                    let mut expected = model.flattened();
                    expected.reverse();
                    prop_assert_eq!(log.take(), expected);
                }
            }
            check_invariant(&bus, &model)?;
        }
    }
}
