//! # busway-core
//!
//! Core traits for the busway in-process dispatch bus.
//!
//! This crate has minimal dependencies and is designed to be imported by
//! code that declares buses or routers without needing the container
//! implementation in `busway-std`.
//!
//! # Building Blocks
//!
//! ## Bus definition ([`BusTraits`])
//!
//! A zero-sized type that names the capability interface, the address id
//! type and the [`AddressPolicy`] / [`HandlerPolicy`] pair. Everything else
//! about a bus is derived from it.
//!
//! ## Routing ([`Router`])
//!
//! Pre-emptive interceptors consulted before ordinary handlers. A router
//! answers with a [`RoutingState`]; anything other than
//! [`RoutingState::Continue`] consumes the event.
//!
//! ## Result policies ([`ResultPolicy`])
//!
//! How the return values of handlers are folded by result-returning
//! dispatch: [`KeepLast`], [`Reduce`], [`Aggregate`] or a plain `Vec`.
//!
//! # Error Types
//!
//! - [`BusError`] - Programmer misuse of connection management

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod bus;
mod error;
mod key;
mod result;
mod router;

// Re-exports
pub use bus::{AddressPolicy, BusId, BusTraits, HandlerPolicy};
pub use error::BusError;
pub use key::{HandlerKey, RouterKey};
pub use result::{Aggregate, KeepLast, Reduce, ResultPolicy};
pub use router::{EventFn, RouteContext, Router, RoutingState};
