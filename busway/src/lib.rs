//! # busway - Typed In-Process Dispatch Bus
//!
//! `busway` routes method calls from publishers to every handler that
//! implements a bus interface, synchronously and in a well-defined order.
//! A bus is declared once as a type; handlers connect by address and are
//! referenced weakly, so the bus never keeps them alive.
//!
//! ## Quick Start
//!
//! ```rust
//! use busway::prelude::*;
//! use std::sync::Arc;
//!
//! pub trait HealthEvents: Send + Sync {
//!     fn on_damage(&self, amount: u32);
//!     fn is_alive(&self) -> bool;
//! }
//!
//! pub struct HealthBus;
//!
//! impl BusTraits for HealthBus {
//!     type Interface = dyn HealthEvents;
//!     type Id = u64;
//!     const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
//! }
//!
//! struct Player;
//!
//! impl HealthEvents for Player {
//!     fn on_damage(&self, _amount: u32) {}
//!     fn is_alive(&self) -> bool { true }
//! }
//!
//! let bus = Bus::<HealthBus>::new();
//! let player: Arc<dyn HealthEvents> = Arc::new(Player);
//! let handler = Handler::from_arc(&bus, &player);
//! handler.connect(7).unwrap();
//!
//! bus.event(&7, |h| h.on_damage(10));
//!
//! let mut alive = Reduce::or(false);
//! bus.event_result(&mut alive, &7, |h| h.is_alive());
//! assert!(alive.into_inner());
//! ```
//!
//! ## Configurations
//!
//! [`AddressPolicy`] and [`HandlerPolicy`] pick one of four shapes: one
//! handler, one handler list, one handler per id, or a handler list per id.
//! The ordered variants sort addresses by [`BusTraits::compare_ids`] and
//! handlers by [`BusTraits::compare_handlers`]. [`BusTraits::on_connect`] and
//! [`BusTraits::on_disconnect`] run custom logic as handlers join and leave.
//!
//! ## Errors
//!
//! Connecting a handler twice, connecting to an occupied single-handler
//! address and disconnecting something that is not connected return a
//! [`BusError`] and leave the bus as it was. They do not panic, in debug
//! builds either; `unwrap` the result where such a mistake should abort.
//!
//! ## Routing
//!
//! Routers connected with [`Bus::connect_router`] see every `event*` and
//! `broadcast*` call first and may consume it; see [`RoutingState`].

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use busway_core::{
    // Bus definition
    AddressPolicy,
    BusId,
    // Errors
    BusError,
    BusTraits,
    // Keys
    HandlerKey,
    HandlerPolicy,
    // Result policies
    Aggregate,
    KeepLast,
    Reduce,
    ResultPolicy,
    // Routing
    EventFn,
    RouteContext,
    Router,
    RouterKey,
    RoutingState,
};

pub use busway_std::{BoundAddress, Bus, Handler, RouterHandle};

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use busway_std::testing::*;
}

/// Prelude module - common imports for busway.
///
/// # Usage
///
/// ```rust
/// use busway::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AddressPolicy, BoundAddress, Bus, BusError, BusTraits, EventFn, Handler, HandlerPolicy,
        KeepLast, Reduce, ResultPolicy, RouteContext, Router, RouterHandle, RoutingState,
    };
}

#[cfg(feature = "macros")]
pub use busway_macros::bus;
