//! Bound addresses.
//!
//! [`BoundAddress`] is a counted reference to one holder. While any clone of
//! it lives the holder exists, even with no handlers connected, so
//! `*_ptr` dispatch skips the id lookup.

use crate::{
    context::{Bus, Deferred},
    table::HolderSlot,
};
use busway_core::BusTraits;
use std::fmt;
use tracing::trace;

/// A counted reference to the holder for one address.
pub struct BoundAddress<B: BusTraits> {
    bus: Bus<B>,
    slot: HolderSlot,
}

impl<B: BusTraits> Bus<B> {
    /// Find or create the holder for `id` and keep it alive.
    pub fn bind(&self, id: B::Id) -> BoundAddress<B> {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        let slot = state.find_or_create(&id);
        state.add_ref(slot);
        trace!(bus = B::name(), ?id, "address bound");

        BoundAddress {
            bus: self.clone(),
            slot,
        }
    }
}

impl<B: BusTraits> BoundAddress<B> {
    /// The address this handle refers to.
    pub fn id(&self) -> B::Id {
        let guard = self.bus.lock();
        let state = guard.borrow();
        state.table.holder(self.slot).id.clone()
    }

    /// The bus context the handle belongs to.
    pub fn bus(&self) -> &Bus<B> {
        &self.bus
    }

    pub(crate) fn slot(&self) -> HolderSlot {
        self.slot
    }
}

impl<B: BusTraits> Clone for BoundAddress<B> {
    fn clone(&self) -> Self {
        let guard = self.bus.lock();
        guard.borrow_mut().add_ref(self.slot);
        Self {
            bus: self.bus.clone(),
            slot: self.slot,
        }
    }
}

impl<B: BusTraits> Drop for BoundAddress<B> {
    fn drop(&mut self) {
        let guard = self.bus.lock();
        match guard.try_borrow_mut() {
            Ok(mut state) => state.release(self.slot),
            Err(_) => self.bus.defer(Deferred::Release(self.slot)),
        }
    }
}

impl<B: BusTraits> fmt::Debug for BoundAddress<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAddress")
            .field("bus", &B::name())
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, ProbeBus, connect_probe};

    #[test]
    fn test_bind_keeps_empty_address_alive() {
        let bus = Bus::<ProbeBus>::new();
        let bound = bus.bind(9);
        assert!(bus.has_address(&9));
        assert_eq!(bus.address_refs(&9), 1);
        assert_eq!(bound.id(), 9);

        let second = bound.clone();
        assert_eq!(bus.address_refs(&9), 2);
        drop(bound);
        assert!(bus.has_address(&9));
        drop(second);
        assert!(!bus.has_address(&9));
    }

    #[test]
    fn test_ptr_dispatch_reaches_later_handlers() {
        let bus = Bus::<ProbeBus>::new();
        let log = CallLog::new();
        let bound = bus.bind(2);
        let (_probe, _handler) = connect_probe(&bus, "late", 2, &log);

        bus.event_ptr(&bound, |h| h.on_probe(0));
        assert_eq!(log.take(), ["late"]);
        assert!(bus.has_handlers_ptr(&bound));
        assert!(bus.find_first_handler_ptr(&bound).is_some());
    }

    #[test]
    fn test_foreign_handle_is_ignored() {
        let bus = Bus::<ProbeBus>::new();
        let other = Bus::<ProbeBus>::new();
        let log = CallLog::new();
        let (_probe, _handler) = connect_probe(&bus, "a", 1, &log);
        let foreign = other.bind(1);

        bus.event_ptr(&foreign, |h| h.on_probe(0));
        assert!(log.is_empty());
        assert!(!bus.has_handlers_ptr(&foreign));
    }

    #[test]
    fn test_release_while_state_borrowed_is_applied_later() {
        let bus = Bus::<ProbeBus>::new();
        let bound = bus.bind(3);
        {
            let guard = bus.lock();
            let _held = guard.borrow();
            drop(bound);
        }
        assert_eq!(bus.address_refs(&3), 0);
        assert!(!bus.has_address(&3));
    }
}
