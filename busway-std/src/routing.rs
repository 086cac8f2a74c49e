//! Router chain: registration, ordering and the routing pass that runs
//! before every `event*`/`broadcast*` dispatch.

use crate::{
    callstack::Frame,
    context::{Bus, Cell, FrameGuard, RouterEntry},
};
use busway_core::{BusError, BusTraits, EventFn, RouteContext, Router, RouterKey, RoutingState};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Consult every router in order.
///
/// Routers see a snapshot of the chain taken when routing starts; a router
/// disconnected by an earlier one in the same pass is skipped.
pub(crate) fn route<B: BusTraits>(
    cell: &Cell<B>,
    id: Option<&B::Id>,
    reverse: bool,
    event: &mut EventFn<'_, B>,
) -> RoutingState {
    let chain: Vec<(RouterKey, Arc<dyn Router<B>>)> = {
        let state = cell.borrow();
        if state.routers.is_empty() {
            return RoutingState::Continue;
        }
        state
            .routers
            .iter()
            .map(|entry| (entry.key, Arc::clone(&entry.router)))
            .collect()
    };

    let _frame = FrameGuard::push(cell, Frame::marker(id.cloned()));
    let ctx = RouteContext::new(id, reverse);
    let mut outcome = RoutingState::Continue;

    for (key, router) in &chain {
        let still_connected = cell.borrow().routers.iter().any(|r| r.key == *key);
        if !still_connected {
            continue;
        }

        let decision = router.route(&ctx, event);
        if decision.is_consumed() {
            debug!(bus = B::name(), router = %key, ?decision, ?id, "event consumed by router");
            outcome = decision;
            if decision.stops_routing() {
                break;
            }
        }
    }

    outcome
}

impl<B: BusTraits> Bus<B> {
    /// Connect a router at order `0`.
    pub fn connect_router<R: Router<B>>(&self, router: R) -> RouterHandle<B> {
        self.connect_router_with_order(router, 0)
    }

    /// Connect a router. Lower orders run first; equal orders keep
    /// connection order.
    pub fn connect_router_with_order<R: Router<B>>(&self, router: R, order: i32) -> RouterHandle<B> {
        let key = RouterKey::next();
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        let position = state.routers.partition_point(|entry| entry.order <= order);
        state.routers.insert(
            position,
            RouterEntry {
                key,
                order,
                router: Arc::new(router),
            },
        );
        trace!(bus = B::name(), router = %key, order, "router connected");

        RouterHandle {
            bus: self.clone(),
            key,
            connected: true,
        }
    }

    /// Remove a router from the chain.
    pub fn disconnect_router(&self, key: RouterKey) -> Result<(), BusError> {
        let guard = self.lock();
        let Some(removed) = take_router(&guard, key) else {
            let err = BusError::RouterNotConnected {
                bus: B::name(),
                router: key,
            };
            error!(bus = B::name(), %err, "disconnect rejected");
            return Err(err);
        };
        // The router may own handlers or bound addresses that disconnect
        // themselves as it drops, so the state must not be borrowed here.
        drop(removed);
        Ok(())
    }

    /// Number of connected routers.
    pub fn router_count(&self) -> usize {
        self.lock().borrow().routers.len()
    }
}

/// Unlink the router `key` and hand it back to be dropped by the caller.
fn take_router<B: BusTraits>(cell: &Cell<B>, key: RouterKey) -> Option<RouterEntry<B>> {
    let mut state = cell.borrow_mut();
    let position = state.routers.iter().position(|entry| entry.key == key)?;
    trace!(bus = B::name(), router = %key, "router disconnected");
    Some(state.routers.remove(position))
}

/// Connection of one router. The router is removed when the handle drops.
pub struct RouterHandle<B: BusTraits> {
    bus: Bus<B>,
    key: RouterKey,
    connected: bool,
}

impl<B: BusTraits> RouterHandle<B> {
    /// Identity of the router.
    pub fn key(&self) -> RouterKey {
        self.key
    }

    /// Whether the router is still in the chain.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Remove the router now. Disconnecting twice is an error.
    pub fn disconnect(&mut self) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::RouterNotConnected {
                bus: B::name(),
                router: self.key,
            });
        }
        self.connected = false;
        self.bus.disconnect_router(self.key)
    }

    /// Keep the router connected for the life of the bus context.
    pub fn forget(mut self) {
        self.connected = false;
    }
}

impl<B: BusTraits> Drop for RouterHandle<B> {
    fn drop(&mut self) {
        if self.connected {
            self.connected = false;
            let guard = self.bus.lock();
            let removed = take_router(&guard, self.key);
            drop(removed);
        }
    }
}

impl<B: BusTraits> std::fmt::Debug for RouterHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("bus", &B::name())
            .field("key", &self.key)
            .field("connected", &self.connected)
            .finish()
    }
}
