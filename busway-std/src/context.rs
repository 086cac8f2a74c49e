//! # Dispatch context
//!
//! [`Bus`] is the shared state of one bus: the address table, the router
//! chain and the stack of in-flight traversal frames, all behind a single
//! reentrant lock.
//!
//! # Locking
//!
//! The lock is a [`parking_lot::ReentrantMutex`] (owner thread id plus a
//! recursion count). A thread already inside an operation on a bus may call
//! back into the same bus from a handler; any other thread blocks until the
//! outermost call returns. Because the mutex only hands out shared access,
//! the state sits in a `RefCell`. Borrows of that cell are always short and
//! are never held while user code (handlers, routers, callbacks) runs.
//!
//! Values removed from the state that may own user types (routers) are
//! dropped only after the borrow ends. Should a [`Handler`](crate::Handler)
//! or [`BoundAddress`](crate::BoundAddress) still be dropped while the state
//! is borrowed, its change is queued and applied by the next operation on
//! the bus.

use crate::{
    callstack::{self, Frame},
    registry,
    table::{AddressTable, Entry, HolderSlot},
};
use busway_core::{BusError, BusTraits, HandlerKey, HandlerPolicy, Router, RouterKey};
use fxhash::FxHashMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::{
    cell::RefCell,
    cmp, fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::{error, trace, warn};

/// A registered router and its position in the chain.
pub(crate) struct RouterEntry<B: BusTraits> {
    pub(crate) key: RouterKey,
    pub(crate) order: i32,
    pub(crate) router: Arc<dyn Router<B>>,
}

/// Everything guarded by the context lock.
pub(crate) struct State<B: BusTraits> {
    pub(crate) table: AddressTable<B>,
    /// Back-links: which holders each handler is connected to.
    pub(crate) connections: FxHashMap<HandlerKey, Vec<HolderSlot>>,
    pub(crate) routers: Vec<RouterEntry<B>>,
    pub(crate) frames: Vec<Frame<B::Id>>,
}

impl<B: BusTraits> State<B> {
    fn new() -> Self {
        Self {
            table: AddressTable::new(),
            connections: FxHashMap::default(),
            routers: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Find or create the holder for `id`, telling broadcast frames about a
    /// newly inserted address.
    pub(crate) fn find_or_create(&mut self, id: &B::Id) -> HolderSlot {
        let (slot, inserted) = self.table.find_or_create(id);
        if let Some(position) = inserted {
            // The cursor adjustment for the shift is applied after the fact;
            // nothing can read the table in between.
            callstack::will_insert_address(&mut self.frames, position);
            callstack::address_list_mutated(&mut self.frames, self.table.len());
            trace!(bus = B::name(), ?id, position, "address created");
        }
        slot
    }

    pub(crate) fn add_ref(&mut self, slot: HolderSlot) {
        self.table.add_ref(slot);
    }

    /// Drop one reference and erase the holder if nothing keeps it alive.
    pub(crate) fn release(&mut self, slot: HolderSlot) {
        if self.table.release(slot) {
            self.erase(slot);
        }
    }

    fn erase(&mut self, slot: HolderSlot) {
        let id = self.table.holder(slot).id.clone();
        // Table cursors are repaired inside the same critical section as the
        // removal, before any other code can observe the table.
        if let Some(position) = self.table.erase(slot) {
            callstack::will_remove_address(&mut self.frames, position);
            callstack::address_list_mutated(&mut self.frames, self.table.len());
            trace!(bus = B::name(), ?id, "address erased");
        }
    }

    fn render(id: &B::Id) -> String {
        format!("{id:?}")
    }

    /// Link `key` at `id`, in front of `before` when that handler is still
    /// there and at the tail otherwise.
    pub(crate) fn connect(
        &mut self,
        key: HandlerKey,
        target: Weak<B::Interface>,
        id: &B::Id,
        before: Option<HandlerKey>,
    ) -> Result<(), BusError> {
        if let Some(slot) = self.table.find(id) {
            let holder = self.table.holder(slot);
            if holder.position(key).is_some() {
                return Err(BusError::AlreadyConnected {
                    bus: B::name(),
                    handler: key,
                    address: Self::render(id),
                });
            }
            if B::HANDLER_POLICY == HandlerPolicy::Single {
                if let Some(occupant) = holder.handlers.first() {
                    return Err(BusError::AddressOccupied {
                        bus: B::name(),
                        address: Self::render(id),
                        occupant: occupant.key,
                    });
                }
            }
        }

        let slot = self.find_or_create(id);
        let Self {
            table,
            frames,
            connections,
            ..
        } = self;
        let holder = table.holder_mut(slot);
        let index = before
            .and_then(|before| holder.position(before))
            .unwrap_or(holder.handlers.len());

        callstack::will_insert_handler(frames, slot, index);
        holder.handlers.insert(index, Entry { key, target });
        callstack::handler_list_mutated(frames, slot, holder.handlers.len());

        connections.entry(key).or_default().push(slot);
        trace!(bus = B::name(), handler = %key, ?id, "handler connected");
        Ok(())
    }

    /// Unlink `key` from one holder, repairing every frame walking it.
    fn unlink(&mut self, slot: HolderSlot, key: HandlerKey) {
        let Self { table, frames, .. } = self;
        let holder = table.holder_mut(slot);
        let Some(index) = holder.position(key) else {
            return;
        };

        callstack::will_remove_handler(frames, slot, index);
        holder.handlers.remove(index);
        callstack::handler_list_mutated(frames, slot, holder.handlers.len());

        if !holder.is_live() {
            self.erase(slot);
        }
    }

    /// The ids `key` would leave: `only`, or every address it is connected
    /// at.
    pub(crate) fn leaving(&self, key: HandlerKey, only: Option<&B::Id>) -> Result<Vec<B::Id>, BusError> {
        let not_connected = || BusError::NotConnected {
            bus: B::name(),
            handler: key,
            address: only.map(Self::render),
        };

        let slots = self.connections.get(&key).ok_or_else(not_connected)?;
        match only {
            None => Ok(slots
                .iter()
                .map(|slot| self.table.holder(*slot).id.clone())
                .collect()),
            Some(id) => {
                let slot = self.table.find(id).ok_or_else(not_connected)?;
                if slots.contains(&slot) {
                    Ok(vec![id.clone()])
                } else {
                    Err(not_connected())
                }
            }
        }
    }

    /// Unlink `key` from `id`. Nothing happens if it is not connected there.
    pub(crate) fn leave(&mut self, key: HandlerKey, id: &B::Id) {
        let Some(slot) = self.table.find(id) else {
            return;
        };
        let Some(slots) = self.connections.get_mut(&key) else {
            return;
        };
        let Some(position) = slots.iter().position(|s| *s == slot) else {
            return;
        };

        slots.remove(position);
        if slots.is_empty() {
            self.connections.remove(&key);
        }
        self.unlink(slot, key);
        trace!(bus = B::name(), handler = %key, ?id, "handler disconnected from address");
    }

    /// Unlink `key` everywhere without running connection hooks.
    pub(crate) fn disconnect_all(&mut self, key: HandlerKey) {
        let Some(slots) = self.connections.remove(&key) else {
            return;
        };
        for slot in slots {
            self.unlink(slot, key);
        }
        trace!(bus = B::name(), handler = %key, "handler disconnected");
    }

    pub(crate) fn connected_ids(&self, key: HandlerKey) -> Vec<B::Id> {
        self.connections
            .get(&key)
            .map(|slots| {
                slots
                    .iter()
                    .map(|slot| self.table.holder(*slot).id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub(crate) type Cell<B> = RefCell<State<B>>;

/// A state change that found the state borrowed.
#[derive(Debug)]
pub(crate) enum Deferred {
    Disconnect(HandlerKey),
    Release(HolderSlot),
}

struct Context<B: BusTraits> {
    state: ReentrantMutex<Cell<B>>,
    dispatches: AtomicUsize,
    deferred: Mutex<Vec<Deferred>>,
}

/// One bus instance: address table, router chain and traversal frames.
///
/// `Bus` is a cheap, clonable handle; clones share the same context. Use
/// [`Bus::global`] for the lazily created process-wide context of a bus
/// definition, or [`Bus::new`] for an isolated one.
pub struct Bus<B: BusTraits> {
    inner: Arc<Context<B>>,
}

impl<B: BusTraits> Bus<B> {
    /// Create an isolated bus context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Context {
                state: ReentrantMutex::new(RefCell::new(State::new())),
                dispatches: AtomicUsize::new(0),
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The process-wide context for `B`, created on first use.
    pub fn global() -> Self {
        registry::global::<B>()
    }

    /// The bus signature.
    pub fn name(&self) -> &'static str {
        B::name()
    }

    /// Whether two handles share one context.
    pub fn same_bus(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take the context lock, first applying any deferred changes.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Cell<B>> {
        let guard = self.inner.state.lock();
        self.settle(&guard);
        guard
    }

    pub(crate) fn defer(&self, change: Deferred) {
        warn!(bus = B::name(), ?change, "bus state busy, change deferred");
        self.inner.deferred.lock().push(change);
    }

    fn settle(&self, cell: &Cell<B>) {
        let mut deferred = self.inner.deferred.lock();
        if deferred.is_empty() {
            return;
        }
        let Ok(mut state) = cell.try_borrow_mut() else {
            return;
        };
        for change in deferred.drain(..) {
            match change {
                Deferred::Disconnect(key) => state.disconnect_all(key),
                Deferred::Release(slot) => state.release(slot),
            }
        }
    }

    pub(crate) fn enter_dispatch(&self) -> DispatchScope<'_> {
        self.inner.dispatches.fetch_add(1, Ordering::AcqRel);
        DispatchScope(&self.inner.dispatches)
    }

    /// Run `f` against the state only if this thread can take the lock
    /// without waiting (it already owns it, or nobody does).
    fn try_with_state<R>(&self, f: impl FnOnce(&State<B>) -> R) -> Option<R> {
        let guard = self.inner.state.try_lock()?;
        let state = guard.try_borrow().ok()?;
        Some(f(&state))
    }

    // ------------------------------------------------------------------
    // Connection management
    // ------------------------------------------------------------------

    pub(crate) fn connect_key(
        &self,
        key: HandlerKey,
        target: &Weak<B::Interface>,
        id: &B::Id,
    ) -> Result<(), BusError> {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let before = if B::HANDLER_POLICY.is_ordered() {
            insertion_point(cell, id, target)
        } else {
            None
        };

        let result = cell.borrow_mut().connect(key, target.clone(), id, before);
        match &result {
            Ok(()) => {
                if let Some(handler) = target.upgrade() {
                    at_address(cell, id, || B::on_connect(&*handler, id));
                }
            }
            Err(err) => error!(bus = B::name(), %err, "connect rejected"),
        }
        result
    }

    /// Disconnect from `only`, or from every address.
    pub(crate) fn disconnect_key(
        &self,
        key: HandlerKey,
        target: &Weak<B::Interface>,
        only: Option<&B::Id>,
    ) -> Result<(), BusError> {
        let guard = self.lock();
        let result = detach(&guard, key, target, only);
        if let Err(err) = &result {
            error!(bus = B::name(), %err, "disconnect rejected");
        }
        result
    }

    /// Disconnect a handler that is going away, deferring if the state is
    /// borrowed.
    pub(crate) fn drop_key(&self, key: HandlerKey, target: &Weak<B::Interface>) {
        let guard = self.lock();
        let connected = guard
            .try_borrow_mut()
            .map(|state| state.connections.contains_key(&key));
        match connected {
            Ok(true) => {
                let _ = detach(&guard, key, target, None);
            }
            Ok(false) => {}
            Err(_) => self.defer(Deferred::Disconnect(key)),
        }
    }

    pub(crate) fn is_key_connected(&self, key: HandlerKey) -> bool {
        self.lock().borrow().connections.contains_key(&key)
    }

    pub(crate) fn connected_ids_of(&self, key: HandlerKey) -> Vec<B::Id> {
        self.lock().borrow().connected_ids(key)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of handler connections across every address.
    ///
    /// A handler connected to two addresses counts twice.
    pub fn total_handlers(&self) -> usize {
        self.lock()
            .borrow()
            .table
            .holders()
            .map(|h| h.handlers.len())
            .sum()
    }

    /// Whether any handler is connected anywhere.
    pub fn has_handlers(&self) -> bool {
        self.lock()
            .borrow()
            .table
            .holders()
            .any(|h| !h.handlers.is_empty())
    }

    /// Whether any handler is connected at `id`.
    pub fn has_handlers_id(&self, id: &B::Id) -> bool {
        self.handler_count(id) > 0
    }

    /// Number of handlers connected at `id`.
    pub fn handler_count(&self, id: &B::Id) -> usize {
        let guard = self.lock();
        let state = guard.borrow();
        state
            .table
            .find(id)
            .map_or(0, |slot| state.table.holder(slot).handlers.len())
    }

    /// Whether a holder currently exists for `id`.
    ///
    /// A holder exists exactly while it has handlers or is referenced by a
    /// dispatch or a [`BoundAddress`](crate::BoundAddress).
    pub fn has_address(&self, id: &B::Id) -> bool {
        self.lock().borrow().table.find(id).is_some()
    }

    /// Number of live addresses.
    pub fn address_count(&self) -> usize {
        self.lock().borrow().table.len()
    }

    /// Number of references (dispatches and bind handles) on `id`.
    pub fn address_refs(&self, id: &B::Id) -> usize {
        let guard = self.lock();
        let state = guard.borrow();
        state
            .table
            .find(id)
            .map_or(0, |slot| state.table.holder(slot).refs())
    }

    /// The first live handler connected at `id`, in connection order.
    pub fn find_first_handler(&self, id: &B::Id) -> Option<Arc<B::Interface>> {
        let guard = self.lock();
        let state = guard.borrow();
        let slot = state.table.find(id)?;
        state
            .table
            .holder(slot)
            .handlers
            .iter()
            .find_map(|e| e.target.upgrade())
    }

    /// The address the innermost dispatch on this thread is delivering to.
    ///
    /// `None` outside dispatch, and between addresses of a broadcast.
    pub fn current_id(&self) -> Option<B::Id> {
        self.try_with_state(|state| state.frames.last().and_then(|f| f.id.clone()))
            .flatten()
    }

    /// Whether any thread is dispatching on this bus.
    pub fn is_in_dispatch(&self) -> bool {
        self.inner.dispatches.load(Ordering::Acquire) > 0
    }

    /// Whether the calling thread is inside a dispatch on this bus.
    pub fn is_in_dispatch_this_thread(&self) -> bool {
        self.try_with_state(|state| !state.frames.is_empty())
            .unwrap_or(false)
    }
}

/// The handler an ordered connection at `id` goes in front of: the first
/// live one that `target` sorts strictly before.
///
/// The comparator runs without the state borrowed, over a snapshot of the
/// handlers.
fn insertion_point<B: BusTraits>(
    cell: &Cell<B>,
    id: &B::Id,
    target: &Weak<B::Interface>,
) -> Option<HandlerKey> {
    let incoming = target.upgrade()?;
    let present: Vec<(HandlerKey, Arc<B::Interface>)> = {
        let state = cell.borrow();
        let slot = state.table.find(id)?;
        state
            .table
            .holder(slot)
            .handlers
            .iter()
            .filter_map(|entry| Some((entry.key, entry.target.upgrade()?)))
            .collect()
    };

    present
        .iter()
        .find(|(_, handler)| B::compare_handlers(&*incoming, &**handler) == cmp::Ordering::Less)
        .map(|(key, _)| *key)
}

/// Run a connection hook with `id` as the current address.
fn at_address<B: BusTraits>(cell: &Cell<B>, id: &B::Id, hook: impl FnOnce()) {
    let _frame = FrameGuard::push(cell, Frame::marker(Some(id.clone())));
    hook();
}

/// Run the disconnect hooks, then unlink. Hooks may have changed the
/// connections already; whatever is left is removed.
fn detach<B: BusTraits>(
    cell: &Cell<B>,
    key: HandlerKey,
    target: &Weak<B::Interface>,
    only: Option<&B::Id>,
) -> Result<(), BusError> {
    let ids = cell.borrow().leaving(key, only)?;
    if let Some(handler) = target.upgrade() {
        for id in &ids {
            at_address(cell, id, || B::on_disconnect(&*handler, id));
        }
    }

    let mut state = cell.borrow_mut();
    for id in &ids {
        state.leave(key, id);
    }
    Ok(())
}

impl<B: BusTraits> Clone for Bus<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BusTraits> Default for Bus<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BusTraits> fmt::Debug for Bus<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &B::name())
            .field("dispatches", &self.inner.dispatches.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Counts one in-flight dispatch for [`Bus::is_in_dispatch`].
pub(crate) struct DispatchScope<'a>(&'a AtomicUsize);

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Pushes a frame on creation and pops it (releasing its pins) on drop,
/// also when a handler panics.
pub(crate) struct FrameGuard<'a, B: BusTraits> {
    cell: &'a Cell<B>,
    depth: usize,
}

impl<'a, B: BusTraits> FrameGuard<'a, B> {
    pub(crate) fn push(cell: &'a Cell<B>, frame: Frame<B::Id>) -> Self {
        let mut state = cell.borrow_mut();
        let depth = state.frames.len();
        state.frames.push(frame);
        Self { cell, depth }
    }

    pub(crate) const fn depth(&self) -> usize {
        self.depth
    }

    /// Keep `slot` alive until [`Self::unpin_all`] or the frame pops.
    pub(crate) fn pin(&self, slot: HolderSlot) {
        let mut state = self.cell.borrow_mut();
        state.add_ref(slot);
        state.frames[self.depth].pins.push(slot);
    }

    /// Release every pin, in the order they were taken.
    pub(crate) fn unpin_all(&self) {
        let mut state = self.cell.borrow_mut();
        let pins = std::mem::take(&mut state.frames[self.depth].pins);
        for slot in pins {
            state.release(slot);
        }
    }
}

impl<B: BusTraits> Drop for FrameGuard<'_, B> {
    fn drop(&mut self) {
        let Ok(mut state) = self.cell.try_borrow_mut() else {
            return;
        };
        if state.frames.len() <= self.depth {
            return;
        }
        let popped = state.frames.split_off(self.depth);
        for frame in popped.into_iter().rev() {
            for slot in frame.pins {
                state.release(slot);
            }
        }
    }
}
