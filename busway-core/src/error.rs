//! Error types for busway.
//!
//! Every error here reports programmer misuse of a bus: connecting twice,
//! occupying a single-handler address, or disconnecting something that was
//! never connected. The rejected operation leaves the bus untouched.
//!
//! These mistakes are reported, never asserted: debug and release builds
//! behave the same, and the caller decides whether a rejected connect is
//! fatal. Each one is also logged at `error` level, naming the bus.
//!
//! Dispatching to an address nobody listens on is not an error and has no
//! variant here; it is a silent no-op.

use crate::key::{HandlerKey, RouterKey};
use thiserror::Error;

/// Errors returned by connection management on a bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The handler is already connected to this address.
    #[error("{handler} is already connected to address {address} on bus `{bus}`")]
    AlreadyConnected {
        /// Bus signature.
        bus: &'static str,
        /// The offending handler.
        handler: HandlerKey,
        /// Rendered address id.
        address: String,
    },

    /// The bus allows one handler per address and another one holds it.
    #[error("address {address} on bus `{bus}` is already occupied by {occupant}")]
    AddressOccupied {
        /// Bus signature.
        bus: &'static str,
        /// Rendered address id.
        address: String,
        /// The handler currently connected there.
        occupant: HandlerKey,
    },

    /// The handler is not connected (at all, or to the named address).
    #[error("{handler} is not connected{} on bus `{bus}`", at_address(.address))]
    NotConnected {
        /// Bus signature.
        bus: &'static str,
        /// The offending handler.
        handler: HandlerKey,
        /// Rendered address id, when a specific address was requested.
        address: Option<String>,
    },

    /// The router is not registered on this bus.
    #[error("{router} is not connected on bus `{bus}`")]
    RouterNotConnected {
        /// Bus signature.
        bus: &'static str,
        /// The offending router.
        router: RouterKey,
    },
}

fn at_address(address: &Option<String>) -> String {
    address
        .as_deref()
        .map(|a| format!(" to address {a}"))
        .unwrap_or_default()
}
