//! # Pre-emption Layer (Router)
//!
//! A Router intercepts every `Event`/`Broadcast` on a bus *before* ordinary
//! handlers see it. Routers are consulted in ascending order (ties keep
//! registration order) and each one decides, explicitly through its return
//! value, whether ordinary dispatch still happens.
//!
//! # Roles
//!
//! - **Interception**: observe or rewrite traffic (e.g. logging, filtering).
//! - **Bridging**: forward the call to another bus (version adapters).
//! - **Consumption**: claim the event so listeners never see it.
//!
//! A router receives the event as a callable that applies the original call
//! to any implementation of the bus interface, so it can invoke the event on
//! its own interface object or hand it on elsewhere.

use crate::bus::BusTraits;

/// What a router decided about the current event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoutingState {
    /// Not consumed: keep consulting routers, then dispatch to listeners.
    #[default]
    Continue,
    /// Consumed: later routers still observe the event, listeners do not.
    SkipListeners,
    /// Consumed: stop immediately, no further routers and no listeners.
    SkipListenersAndRouters,
}

impl RoutingState {
    /// Whether ordinary handlers are skipped.
    pub const fn is_consumed(self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Whether the remaining routers are skipped.
    pub const fn stops_routing(self) -> bool {
        matches!(self, Self::SkipListenersAndRouters)
    }
}

impl From<bool> for RoutingState {
    /// `true` means "consumed": stop routing and skip listeners.
    fn from(consumed: bool) -> Self {
        if consumed {
            Self::SkipListenersAndRouters
        } else {
            Self::Continue
        }
    }
}

/// Information about the event being routed.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a, Id> {
    id: Option<&'a Id>,
    reverse: bool,
}

impl<'a, Id> RouteContext<'a, Id> {
    /// Describe an event addressed to `id` (or a broadcast when `None`).
    pub const fn new(id: Option<&'a Id>, reverse: bool) -> Self {
        Self { id, reverse }
    }

    /// The target address, `None` for broadcasts.
    pub const fn id(&self) -> Option<&'a Id> {
        self.id
    }

    /// Whether the event is a broadcast to every address.
    pub const fn is_broadcast(&self) -> bool {
        self.id.is_none()
    }

    /// Whether the event is being routed from an event queue.
    ///
    /// Dispatch is always synchronous, so this is always `false`.
    pub const fn is_queued(&self) -> bool {
        false
    }

    /// Whether listeners would be visited in reverse order.
    pub const fn is_reverse(&self) -> bool {
        self.reverse
    }
}

/// The dispatched call as handed to a router: apply it to any
/// implementation of the bus interface.
///
/// Spell router signatures with this alias; it pins the interface's
/// `'static` object bound, which a hand-written `&dyn Trait` would not.
pub type EventFn<'a, B> = dyn FnMut(&<B as BusTraits>::Interface) + 'a;

/// A pre-emptive interceptor for one bus.
///
/// `event` applies the dispatched call to an interface implementation. A
/// router that wants to observe the call invokes it on its own object; one
/// that wants to bridge invokes it on whatever the target expects.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot route events of bus `{B}`",
    label = "missing `Router` implementation",
    note = "Implement `Router<{B}>` or pass a closure `Fn(&RouteContext<_>, &mut EventFn<_>) -> RoutingState`."
)]
pub trait Router<B: BusTraits>: Send + Sync + 'static {
    /// Inspect the event and decide whether listeners still see it.
    fn route(
        &self,
        ctx: &RouteContext<'_, B::Id>,
        event: &mut EventFn<'_, B>,
    ) -> RoutingState;
}

// Blanket impl for closures
impl<B, F> Router<B> for F
where
    B: BusTraits,
    F: Fn(&RouteContext<'_, B::Id>, &mut EventFn<'_, B>) -> RoutingState
        + Send
        + Sync
        + 'static,
{
    fn route(
        &self,
        ctx: &RouteContext<'_, B::Id>,
        event: &mut EventFn<'_, B>,
    ) -> RoutingState {
        (self)(ctx, event)
    }
}
