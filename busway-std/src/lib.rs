//! # busway-std
//!
//! The bus container and dispatcher for busway.
//!
//! This crate provides:
//! - **Bus contexts**: [`Bus`], isolated ([`Bus::new`]) or process-wide ([`Bus::global`])
//! - **Connections**: [`Handler`] for interface implementations, [`BoundAddress`] for cached addresses
//! - **Dispatch**: `event`, `broadcast`, their `_result`/`_reverse`/`_ptr` variants and `enumerate_*`
//! - **Routing**: [`RouterHandle`] and the ordered router chain
//! - **Testing**: [`testing`] helpers
//!
//! Every operation on a bus runs under that bus's reentrant lock, so
//! dispatch is serialized across threads while handlers may freely call
//! back into the same bus, including connecting and disconnecting handlers
//! while they are being visited.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use busway_core;

mod bind;
mod callstack;
mod context;
mod dispatch;
mod handler;
mod registry;
mod routing;
mod table;
pub mod testing;

pub use bind::BoundAddress;
pub use context::Bus;
pub use handler::Handler;
pub use routing::RouterHandle;
