//! Handler connections.
//!
//! A [`Handler`] ties one interface implementation to a bus context. The
//! bus only ever holds a `Weak` reference to the implementation; the
//! [`Handler`] value owns the connection and disconnects from every address
//! when dropped.
//!
//! # Self-referencing handlers
//!
//! A handler that needs to disconnect itself from inside a callback stores
//! its own [`Handler`], built from the `Weak` handed out by
//! [`Arc::new_cyclic`]:
//!
//! ```rust
//! use busway_std::{Bus, Handler, testing::{ProbeBus, ProbeEvents}};
//! use std::sync::{Arc, Weak};
//!
//! struct OneShot {
//!     handler: Handler<ProbeBus>,
//! }
//!
//! impl ProbeEvents for OneShot {
//!     fn on_probe(&self, _value: u32) {
//!         let _ = self.handler.disconnect();
//!     }
//! }
//!
//! let bus = Bus::<ProbeBus>::new();
//! let one_shot = Arc::new_cyclic(|me: &Weak<OneShot>| OneShot {
//!     handler: Handler::new(&bus, me.clone() as Weak<dyn ProbeEvents>),
//! });
//! one_shot.handler.connect(3).unwrap();
//!
//! bus.event(&3, |h| h.on_probe(0));
//! assert!(!bus.has_handlers_id(&3));
//! ```

use crate::context::Bus;
use busway_core::{BusError, BusTraits, HandlerKey};
use std::{
    fmt,
    sync::{Arc, Weak},
};

/// The connection of one handler to a bus.
pub struct Handler<B: BusTraits> {
    bus: Bus<B>,
    key: HandlerKey,
    target: Weak<B::Interface>,
}

impl<B: BusTraits> Handler<B> {
    /// Create an unconnected handler for `target`.
    pub fn new(bus: &Bus<B>, target: Weak<B::Interface>) -> Self {
        Self {
            bus: bus.clone(),
            key: HandlerKey::next(),
            target,
        }
    }

    /// Create an unconnected handler for a shared implementation.
    pub fn from_arc(bus: &Bus<B>, target: &Arc<B::Interface>) -> Self {
        Self::new(bus, Arc::downgrade(target))
    }

    /// Connect at `id`, then run [`BusTraits::on_connect`].
    ///
    /// Fails if this handler is already connected there, or if the bus
    /// allows one handler per address and another one occupies it.
    pub fn connect(&self, id: B::Id) -> Result<(), BusError> {
        self.bus.connect_key(self.key, &self.target, &id)
    }

    /// Disconnect from every address, running [`BusTraits::on_disconnect`]
    /// for each first.
    pub fn disconnect(&self) -> Result<(), BusError> {
        self.bus.disconnect_key(self.key, &self.target, None)
    }

    /// Disconnect from `id` only.
    pub fn disconnect_id(&self, id: &B::Id) -> Result<(), BusError> {
        self.bus.disconnect_key(self.key, &self.target, Some(id))
    }

    /// Whether the handler is connected anywhere.
    pub fn is_connected(&self) -> bool {
        self.bus.is_key_connected(self.key)
    }

    /// Whether the handler is connected at `id`.
    pub fn is_connected_id(&self, id: &B::Id) -> bool {
        self.connected_ids().iter().any(|connected| connected == id)
    }

    /// Every address the handler is connected at, in connection order.
    pub fn connected_ids(&self) -> Vec<B::Id> {
        self.bus.connected_ids_of(self.key)
    }

    /// Identity of this handler.
    pub fn key(&self) -> HandlerKey {
        self.key
    }

    /// The bus context this handler belongs to.
    pub fn bus(&self) -> &Bus<B> {
        &self.bus
    }
}

impl<B: BusTraits> Handler<B>
where
    B::Id: Default,
{
    /// Connect at the default id, the usual form for single-address buses.
    pub fn connect_default(&self) -> Result<(), BusError> {
        self.connect(B::Id::default())
    }
}

impl<B: BusTraits> Drop for Handler<B> {
    fn drop(&mut self) {
        self.bus.drop_key(self.key, &self.target);
    }
}

impl<B: BusTraits> fmt::Debug for Handler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("bus", &B::name())
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
