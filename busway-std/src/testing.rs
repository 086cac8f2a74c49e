//! Testing utilities for busway.
//!
//! Helpers for writing tests against buses: a shared call log and a
//! ready-made probe bus whose handlers record every call they receive.
//!
//! # Features
//!
//! - [`CallLog`]: A clonable, thread-safe log of observed calls
//! - [`ProbeBus`]: An addressed bus (`u32` ids, many handlers per address)
//! - [`Probe`]: A [`ProbeEvents`] handler that records its name on every call

use crate::{Bus, Handler};
use busway_core::{AddressPolicy, BusTraits};
use parking_lot::Mutex;
use std::sync::Arc;

// ============================================================================
// Call Log
// ============================================================================

/// A shared, ordered record of calls.
///
/// # Example
///
/// ```rust
/// use busway_std::testing::CallLog;
///
/// let log = CallLog::new();
/// let writer = log.clone();
/// writer.push("first");
/// writer.push("second");
/// assert_eq!(log.take(), ["first", "second"]);
/// assert!(log.is_empty());
/// ```
#[derive(Debug)]
pub struct CallLog<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> CallLog<T> {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append an entry.
    pub fn push(&self, entry: T) {
        self.entries.lock().push(entry);
    }

    /// Remove and return every entry.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of entries recorded.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: Clone> CallLog<T> {
    /// Copy of the entries without clearing them.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().clone()
    }
}

impl<T> Clone for CallLog<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for CallLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Probe Bus
// ============================================================================

/// Interface of [`ProbeBus`].
pub trait ProbeEvents: Send + Sync {
    /// A plain notification.
    fn on_probe(&self, value: u32);

    /// A query answered by each handler.
    fn answer(&self) -> u32 {
        0
    }
}

/// An addressed bus with `u32` ids and any number of handlers per address.
#[derive(Debug)]
pub struct ProbeBus;

impl BusTraits for ProbeBus {
    type Interface = dyn ProbeEvents;
    type Id = u32;
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;

    fn name() -> &'static str {
        "ProbeBus"
    }
}

/// A handler that logs its name for every `on_probe` it receives.
#[derive(Debug)]
pub struct Probe {
    name: String,
    answer: u32,
    log: CallLog<String>,
}

impl Probe {
    /// Create a probe writing to `log`.
    pub fn new(name: impl Into<String>, log: &CallLog<String>) -> Self {
        Self {
            name: name.into(),
            answer: 0,
            log: log.clone(),
        }
    }

    /// Set the value returned from [`ProbeEvents::answer`].
    pub fn with_answer(mut self, answer: u32) -> Self {
        self.answer = answer;
        self
    }

    /// Create a probe already erased to the bus interface.
    pub fn arc(name: impl Into<String>, log: &CallLog<String>) -> Arc<dyn ProbeEvents> {
        Arc::new(Self::new(name, log))
    }

    /// The probe's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ProbeEvents for Probe {
    fn on_probe(&self, _value: u32) {
        self.log.push(self.name.clone());
    }

    fn answer(&self) -> u32 {
        self.answer
    }
}

/// Connect a fresh probe named `name` at `id`.
///
/// Returns the probe (which must stay alive to receive calls) and its
/// connection.
pub fn connect_probe(
    bus: &Bus<ProbeBus>,
    name: &str,
    id: u32,
    log: &CallLog<String>,
) -> (Arc<dyn ProbeEvents>, Handler<ProbeBus>) {
    let probe = Probe::arc(name, log);
    let handler = Handler::from_arc(bus, &probe);
    if let Err(err) = handler.connect(id) {
        panic!("probe `{name}` failed to connect: {err}");
    }
    (probe, handler)
}
