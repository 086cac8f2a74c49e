//! Address table and per-address handler holders.
//!
//! Holders live in a slab so that a [`HolderSlot`] stays valid for as long as
//! the holder is alive, whatever happens to other addresses. A separate
//! `order` vector fixes the table order used by broadcasts. New holders are
//! appended, or inserted at their sorted position on ordered buses; erasing
//! or inserting shifts later positions by one, which is what the traversal
//! cursors in [`crate::callstack`] repair against.

use busway_core::{BusTraits, HandlerKey};
use fxhash::FxHashMap;
use std::{cmp::Ordering, sync::Weak};

/// Stable index of a live holder in the slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HolderSlot(usize);

/// One connected handler: its identity and a non-owning reference.
pub(crate) struct Entry<I: ?Sized> {
    pub(crate) key: HandlerKey,
    pub(crate) target: Weak<I>,
}

/// Bookkeeping for one address.
pub(crate) struct Holder<B: BusTraits> {
    pub(crate) id: B::Id,
    pub(crate) handlers: Vec<Entry<B::Interface>>,
    refs: usize,
}

impl<B: BusTraits> Holder<B> {
    fn new(id: B::Id) -> Self {
        Self {
            id,
            handlers: Vec::new(),
            refs: 0,
        }
    }

    /// A holder exists while a dispatch or bind handle references it, or
    /// while it still has handlers.
    pub(crate) fn is_live(&self) -> bool {
        self.refs > 0 || !self.handlers.is_empty()
    }

    pub(crate) fn position(&self, key: HandlerKey) -> Option<usize> {
        self.handlers.iter().position(|e| e.key == key)
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs
    }
}

/// Maps address ids to holders and keeps the broadcast order.
pub(crate) struct AddressTable<B: BusTraits> {
    slots: Vec<Option<Holder<B>>>,
    free: Vec<usize>,
    index: FxHashMap<B::Id, HolderSlot>,
    order: Vec<HolderSlot>,
}

impl<B: BusTraits> AddressTable<B> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Look up the holder for `id`.
    ///
    /// Single-address buses have at most one holder and every id resolves
    /// to it.
    pub(crate) fn find(&self, id: &B::Id) -> Option<HolderSlot> {
        if B::ADDRESS_POLICY.is_by_id() {
            self.index.get(id).copied()
        } else {
            self.order.first().copied()
        }
    }

    /// Idempotent lookup-or-insert. For a new holder the table position it
    /// was inserted at is returned as well.
    pub(crate) fn find_or_create(&mut self, id: &B::Id) -> (HolderSlot, Option<usize>) {
        if let Some(slot) = self.find(id) {
            return (slot, None);
        }

        let holder = Holder::new(id.clone());
        let slot = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(holder);
                HolderSlot(index)
            }
            None => {
                self.slots.push(Some(holder));
                HolderSlot(self.slots.len() - 1)
            }
        };

        if B::ADDRESS_POLICY.is_by_id() {
            self.index.insert(id.clone(), slot);
        }
        let position = self.insert_position(id);
        self.order.insert(position, slot);
        (slot, Some(position))
    }

    /// Upper bound of `id` in the table order, so equal ids keep creation
    /// order. Unordered tables always append.
    fn insert_position(&self, id: &B::Id) -> usize {
        if !B::ADDRESS_POLICY.is_ordered() {
            return self.order.len();
        }
        self.order
            .partition_point(|slot| B::compare_ids(&self.holder(*slot).id, id) != Ordering::Greater)
    }

    pub(crate) fn holder(&self, slot: HolderSlot) -> &Holder<B> {
        match self.slots.get(slot.0) {
            Some(Some(holder)) => holder,
            _ => unreachable!("holder slot {} accessed after erase", slot.0),
        }
    }

    pub(crate) fn holder_mut(&mut self, slot: HolderSlot) -> &mut Holder<B> {
        match self.slots.get_mut(slot.0) {
            Some(Some(holder)) => holder,
            _ => unreachable!("holder slot {} accessed after erase", slot.0),
        }
    }

    pub(crate) fn add_ref(&mut self, slot: HolderSlot) {
        self.holder_mut(slot).refs += 1;
    }

    /// Drop one reference. Returns `true` when the holder is no longer live
    /// and must be erased by the caller.
    pub(crate) fn release(&mut self, slot: HolderSlot) -> bool {
        let holder = self.holder_mut(slot);
        debug_assert!(holder.refs > 0, "holder released more often than referenced");
        holder.refs = holder.refs.saturating_sub(1);
        !holder.is_live()
    }

    /// Remove a dead holder. Returns its former position in the table
    /// order so broadcast cursors can be repaired.
    pub(crate) fn erase(&mut self, slot: HolderSlot) -> Option<usize> {
        let holder = self.slots.get_mut(slot.0)?.take()?;
        debug_assert!(!holder.is_live(), "erasing a live holder");

        if B::ADDRESS_POLICY.is_by_id() {
            self.index.remove(&holder.id);
        }
        self.free.push(slot.0);

        let position = self.order.iter().position(|s| *s == slot)?;
        self.order.remove(position);
        Some(position)
    }

    pub(crate) fn order(&self) -> &[HolderSlot] {
        &self.order
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn holders(&self) -> impl Iterator<Item = &Holder<B>> + '_ {
        self.order.iter().map(|slot| self.holder(*slot))
    }
}
