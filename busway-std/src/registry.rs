//! Process-wide bus contexts, one per bus definition type.

use crate::context::Bus;
use busway_core::BusTraits;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::{
    any::{Any, TypeId},
    sync::OnceLock,
};
use tracing::debug;

type Contexts = RwLock<FxHashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static CONTEXTS: OnceLock<Contexts> = OnceLock::new();

/// The global context for `B`, created on first use.
pub(crate) fn global<B: BusTraits>() -> Bus<B> {
    let contexts = CONTEXTS.get_or_init(Contexts::default);
    let type_id = TypeId::of::<B>();

    if let Some(bus) = contexts
        .read()
        .get(&type_id)
        .and_then(|entry| entry.downcast_ref::<Bus<B>>())
    {
        return bus.clone();
    }

    let mut contexts = contexts.write();
    let entry = contexts.entry(type_id).or_insert_with(|| {
        debug!(bus = B::name(), "global bus context created");
        Box::new(Bus::<B>::new())
    });
    match entry.downcast_ref::<Bus<B>>() {
        Some(bus) => bus.clone(),
        None => unreachable!("context registered under the TypeId of another bus"),
    }
}
