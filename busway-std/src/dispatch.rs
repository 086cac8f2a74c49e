//! # Dispatch
//!
//! The synchronous call families of a bus:
//!
//! | Family            | Targets                 | Order      | Routers |
//! |-------------------|-------------------------|------------|---------|
//! | `event*`          | handlers at one address | forward/rev| yes     |
//! | `broadcast*`      | every address           | forward/rev| yes     |
//! | `event*_ptr`      | a bound address         | forward/rev| yes     |
//! | `enumerate_*`     | callback per handler    | forward    | no      |
//!
//! The `*_result` variants feed each handler's return value to a
//! caller-owned [`ResultPolicy`].
//!
//! # Traversal
//!
//! Every pass pushes a [`Frame`] and then repeats: borrow the state, advance
//! the frame's cursor, upgrade the handler, release the borrow, call the
//! handler. A handler may therefore connect or disconnect anything
//! (including itself) and the cursor is repaired before it is read again.

use crate::{
    bind::BoundAddress,
    callstack::{Cursor, Direction, Frame},
    context::{Bus, Cell, FrameGuard, State},
    routing,
    table::HolderSlot,
};
use busway_core::{BusTraits, ResultPolicy};
use std::sync::Arc;
use tracing::{error, warn};

type Visit<'a, I> = &'a mut dyn FnMut(&I) -> bool;

// ============================================================================
// Traversal primitives
// ============================================================================

/// Walk the handlers of whatever holder the frame at `depth` points at.
///
/// Returns `false` if `visit` asked to stop.
fn visit_handlers<B: BusTraits>(
    cell: &Cell<B>,
    depth: usize,
    visit: Visit<'_, B::Interface>,
) -> bool {
    loop {
        let (key, target) = {
            let mut state = cell.borrow_mut();
            let State { table, frames, .. } = &mut *state;
            let frame = &mut frames[depth];
            let Some(slot) = frame.holder else {
                return true;
            };
            let Some(index) = frame.handlers.advance() else {
                return true;
            };
            let entry = &table.holder(slot).handlers[index];
            (entry.key, entry.target.upgrade())
        };

        match target {
            Some(handler) => {
                if !visit(&*handler) {
                    return false;
                }
            }
            None => warn!(
                bus = B::name(),
                handler = %key,
                "skipping handler whose target was dropped while connected"
            ),
        }
    }
}

/// Walk one holder, keeping it alive for the duration.
fn visit_slot<B: BusTraits>(
    cell: &Cell<B>,
    slot: HolderSlot,
    direction: Direction,
    visit: Visit<'_, B::Interface>,
) -> bool {
    let frame = {
        let state = cell.borrow();
        let holder = state.table.holder(slot);
        Frame::over_holder(
            holder.id.clone(),
            slot,
            Cursor::new(direction, holder.handlers.len()),
        )
    };
    let frame = FrameGuard::push(cell, frame);
    frame.pin(slot);
    visit_handlers(cell, frame.depth(), visit)
}

/// Walk the handlers at `id`. Missing addresses are a no-op.
fn visit_id<B: BusTraits>(
    cell: &Cell<B>,
    id: &B::Id,
    direction: Direction,
    visit: Visit<'_, B::Interface>,
) -> bool {
    let slot = cell.borrow().table.find(id);
    match slot {
        Some(slot) => visit_slot(cell, slot, direction, visit),
        None => true,
    }
}

/// Walk every address in table order (or its inverse).
///
/// During a reverse pass the predecessor of the current holder is pinned as
/// well, so that however the handlers reshape the table there is still a
/// holder to step to next.
fn visit_all<B: BusTraits>(
    cell: &Cell<B>,
    direction: Direction,
    visit: Visit<'_, B::Interface>,
) -> bool {
    let len = cell.borrow().table.len();
    let frame = FrameGuard::push(cell, Frame::over_table(Cursor::new(direction, len)));
    let depth = frame.depth();

    loop {
        let (slot, guard) = {
            let mut state = cell.borrow_mut();
            let State { table, frames, .. } = &mut *state;
            let current = &mut frames[depth];
            let Some(position) = current.addresses.as_mut().and_then(Cursor::advance) else {
                return true;
            };

            let slot = table.order()[position];
            let guard = match direction {
                Direction::Reverse if position > 0 => Some(table.order()[position - 1]),
                _ => None,
            };
            let holder = table.holder(slot);
            current.id = Some(holder.id.clone());
            current.holder = Some(slot);
            current.handlers = Cursor::new(direction, holder.handlers.len());
            (slot, guard)
        };

        frame.pin(slot);
        if let Some(guard) = guard {
            frame.pin(guard);
        }

        let keep_going = visit_handlers(cell, depth, visit);

        {
            let mut state = cell.borrow_mut();
            let current = &mut state.frames[depth];
            current.id = None;
            current.holder = None;
        }
        // Current holder first, then the guard.
        frame.unpin_all();

        if !keep_going {
            return false;
        }
    }
}

// ============================================================================
// Public dispatch API
// ============================================================================

impl<B: BusTraits> Bus<B> {
    fn checked_slot(&self, bound: &BoundAddress<B>) -> Option<HolderSlot> {
        if bound.bus().same_bus(self) {
            Some(bound.slot())
        } else {
            error!(
                bus = B::name(),
                "bound address belongs to a different bus context, dispatch ignored"
            );
            None
        }
    }

    fn deliver_id<F>(&self, id: &B::Id, direction: Direction, mut method: F)
    where
        F: FnMut(&B::Interface),
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        let reverse = direction == Direction::Reverse;
        if routing::route(cell, Some(id), reverse, &mut method).is_consumed() {
            return;
        }
        visit_id(cell, id, direction, &mut |handler| {
            method(handler);
            true
        });
    }

    fn deliver_id_result<R, P, F>(&self, results: &mut P, id: &B::Id, direction: Direction, mut method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        let reverse = direction == Direction::Reverse;
        let routed = routing::route(cell, Some(id), reverse, &mut |handler: &B::Interface| {
            method(handler);
        });
        if routed.is_consumed() {
            return;
        }
        visit_id(cell, id, direction, &mut |handler| {
            results.accept(method(handler));
            true
        });
    }

    fn deliver_all<F>(&self, direction: Direction, mut method: F)
    where
        F: FnMut(&B::Interface),
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        let reverse = direction == Direction::Reverse;
        if routing::route(cell, None, reverse, &mut method).is_consumed() {
            return;
        }
        visit_all(cell, direction, &mut |handler| {
            method(handler);
            true
        });
    }

    fn deliver_all_result<R, P, F>(&self, results: &mut P, direction: Direction, mut method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        let reverse = direction == Direction::Reverse;
        let routed = routing::route(cell, None, reverse, &mut |handler: &B::Interface| {
            method(handler);
        });
        if routed.is_consumed() {
            return;
        }
        visit_all(cell, direction, &mut |handler| {
            results.accept(method(handler));
            true
        });
    }

    fn deliver_bound<F>(&self, bound: &BoundAddress<B>, direction: Direction, mut method: F)
    where
        F: FnMut(&B::Interface),
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let Some(slot) = self.checked_slot(bound) else {
            return;
        };
        let _scope = self.enter_dispatch();
        let id = cell.borrow().table.holder(slot).id.clone();
        let reverse = direction == Direction::Reverse;
        if routing::route(cell, Some(&id), reverse, &mut method).is_consumed() {
            return;
        }
        visit_slot(cell, slot, direction, &mut |handler| {
            method(handler);
            true
        });
    }

    fn deliver_bound_result<R, P, F>(
        &self,
        results: &mut P,
        bound: &BoundAddress<B>,
        direction: Direction,
        mut method: F,
    ) where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let Some(slot) = self.checked_slot(bound) else {
            return;
        };
        let _scope = self.enter_dispatch();
        let id = cell.borrow().table.holder(slot).id.clone();
        let reverse = direction == Direction::Reverse;
        let routed = routing::route(cell, Some(&id), reverse, &mut |handler: &B::Interface| {
            method(handler);
        });
        if routed.is_consumed() {
            return;
        }
        visit_slot(cell, slot, direction, &mut |handler| {
            results.accept(method(handler));
            true
        });
    }

    // ------------------------------------------------------------------
    // Event
    // ------------------------------------------------------------------

    /// Call `method` on every handler at `id`, in connection order.
    ///
    /// Routers see the call first. A missing address is a no-op.
    pub fn event<F>(&self, id: &B::Id, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_id(id, Direction::Forward, method);
    }

    /// [`Self::event`], visiting handlers in reverse connection order.
    pub fn event_reverse<F>(&self, id: &B::Id, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_id(id, Direction::Reverse, method);
    }

    /// [`Self::event`], folding each handler's return value into `results`.
    pub fn event_result<R, P, F>(&self, results: &mut P, id: &B::Id, method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_id_result(results, id, Direction::Forward, method);
    }

    /// [`Self::event_result`] in reverse connection order.
    pub fn event_result_reverse<R, P, F>(&self, results: &mut P, id: &B::Id, method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_id_result(results, id, Direction::Reverse, method);
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Call `method` on every handler at every address.
    ///
    /// Addresses are visited in table order and handlers in connection order.
    pub fn broadcast<F>(&self, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_all(Direction::Forward, method);
    }

    /// [`Self::broadcast`] with both orders inverted.
    pub fn broadcast_reverse<F>(&self, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_all(Direction::Reverse, method);
    }

    /// [`Self::broadcast`], folding each handler's return value into `results`.
    pub fn broadcast_result<R, P, F>(&self, results: &mut P, method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_all_result(results, Direction::Forward, method);
    }

    /// [`Self::broadcast_result`] with both orders inverted.
    pub fn broadcast_result_reverse<R, P, F>(&self, results: &mut P, method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_all_result(results, Direction::Reverse, method);
    }

    // ------------------------------------------------------------------
    // Bound address dispatch
    // ------------------------------------------------------------------

    /// [`Self::event`] through a bound address, skipping the lookup.
    ///
    /// A handle from another bus context is rejected with an error log.
    pub fn event_ptr<F>(&self, bound: &BoundAddress<B>, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_bound(bound, Direction::Forward, method);
    }

    /// [`Self::event_ptr`] in reverse connection order.
    pub fn event_reverse_ptr<F>(&self, bound: &BoundAddress<B>, method: F)
    where
        F: FnMut(&B::Interface),
    {
        self.deliver_bound(bound, Direction::Reverse, method);
    }

    /// [`Self::event_result`] through a bound address.
    pub fn event_result_ptr<R, P, F>(&self, results: &mut P, bound: &BoundAddress<B>, method: F)
    where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_bound_result(results, bound, Direction::Forward, method);
    }

    /// [`Self::event_result_ptr`] in reverse connection order.
    pub fn event_result_reverse_ptr<R, P, F>(
        &self,
        results: &mut P,
        bound: &BoundAddress<B>,
        method: F,
    ) where
        P: ResultPolicy<R>,
        F: FnMut(&B::Interface) -> R,
    {
        self.deliver_bound_result(results, bound, Direction::Reverse, method);
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Visit every handler at every address until `callback` returns `false`.
    ///
    /// Routers are not consulted. Returns `false` if the walk was cut short.
    pub fn enumerate_handlers<F>(&self, mut callback: F) -> bool
    where
        F: FnMut(&B::Interface) -> bool,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        visit_all(cell, Direction::Forward, &mut callback)
    }

    /// Visit the handlers at `id` until `callback` returns `false`.
    pub fn enumerate_handlers_id<F>(&self, id: &B::Id, mut callback: F) -> bool
    where
        F: FnMut(&B::Interface) -> bool,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let _scope = self.enter_dispatch();
        visit_id(cell, id, Direction::Forward, &mut callback)
    }

    /// Visit the handlers at a bound address until `callback` returns `false`.
    pub fn enumerate_handlers_ptr<F>(&self, bound: &BoundAddress<B>, mut callback: F) -> bool
    where
        F: FnMut(&B::Interface) -> bool,
    {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let Some(slot) = self.checked_slot(bound) else {
            return true;
        };
        let _scope = self.enter_dispatch();
        visit_slot(cell, slot, Direction::Forward, &mut callback)
    }

    /// The first live handler at a bound address.
    pub fn find_first_handler_ptr(&self, bound: &BoundAddress<B>) -> Option<Arc<B::Interface>> {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let slot = self.checked_slot(bound)?;
        let state = cell.borrow();
        state
            .table
            .holder(slot)
            .handlers
            .iter()
            .find_map(|e| e.target.upgrade())
    }

    /// Whether a bound address currently has handlers.
    pub fn has_handlers_ptr(&self, bound: &BoundAddress<B>) -> bool {
        let guard = self.lock();
        let cell: &Cell<B> = &guard;
        let Some(slot) = self.checked_slot(bound) else {
            return false;
        };
        let state = cell.borrow();
        !state.table.holder(slot).handlers.is_empty()
    }
}
