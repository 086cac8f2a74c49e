//! # Bus Definition Layer
//!
//! A bus is described entirely at compile time by a type implementing
//! [`BusTraits`]. The definition names the capability interface handlers
//! implement, the address id type, and the two cardinality policies that
//! select one of the four container shapes:
//!
//! | Addressing | Handlers  | Shape                                         |
//! |------------|-----------|-----------------------------------------------|
//! | `Single`   | `Single`  | one slot holding at most one handler          |
//! | `Single`   | `Multiple`| one ordered handler list                      |
//! | `ById`     | `Single`  | id → slot holding at most one handler         |
//! | `ById`     | `Multiple`| id → ordered handler list                     |
//!
//! All four shapes share one generic container: the address table
//! degenerates to a single entry and the handler list degenerates to at most
//! one element.
//!
//! # Ordered variants
//!
//! [`AddressPolicy::ByIdAndOrdered`] keeps the table sorted by
//! [`BusTraits::compare_ids`], which fixes the order broadcasts visit
//! addresses in. [`HandlerPolicy::MultipleAndOrdered`] inserts each new
//! handler by [`BusTraits::compare_handlers`] instead of at the tail. Equal
//! elements keep connection order.
//!
//! # Connection hooks
//!
//! [`BusTraits::on_connect`] and [`BusTraits::on_disconnect`] run under the
//! bus lock whenever a handler joins or leaves an address, for example to
//! bring a late subscriber up to date straight away.

use std::{cmp::Ordering, fmt::Debug, hash::Hash};

/// How many addresses a bus has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPolicy {
    /// Every handler shares one implicit address. `Event` and `Broadcast`
    /// reach the same handlers.
    #[default]
    Single,
    /// Handlers connect to a specific id and `Event` targets one id.
    ById,
    /// Like [`AddressPolicy::ById`], with broadcasts visiting addresses in
    /// [`BusTraits::compare_ids`] order instead of creation order.
    ByIdAndOrdered,
}

impl AddressPolicy {
    /// Whether handlers connect to individual ids.
    pub const fn is_by_id(self) -> bool {
        !matches!(self, Self::Single)
    }

    /// Whether the address table is kept sorted.
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::ByIdAndOrdered)
    }
}

/// How many handlers may share one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerPolicy {
    /// At most one handler per address. Connecting a second one is rejected.
    Single,
    /// Any number of handlers per address, visited in connection order.
    #[default]
    Multiple,
    /// Any number of handlers per address, visited in
    /// [`BusTraits::compare_handlers`] order.
    MultipleAndOrdered,
}

impl HandlerPolicy {
    /// Whether new handlers are inserted by comparison.
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::MultipleAndOrdered)
    }
}

/// Address id requirements.
///
/// Implemented for every type that is comparable, hashable, printable and
/// thread-safe. Single-address buses conventionally use `()`.
pub trait BusId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> BusId for T {}

/// Compile-time configuration of one bus.
///
/// # Example
///
/// ```rust
/// use busway_core::{AddressPolicy, BusTraits, HandlerPolicy};
///
/// pub trait TickEvents: Send + Sync {
///     fn on_tick(&self, delta: f32);
/// }
///
/// pub struct TickBus;
///
/// impl BusTraits for TickBus {
///     type Interface = dyn TickEvents;
///     type Id = ();
/// }
///
/// pub struct EntityBus;
///
/// impl BusTraits for EntityBus {
///     type Interface = dyn TickEvents;
///     type Id = u64;
///     const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
///     const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Single;
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a bus definition",
    label = "missing `BusTraits` implementation",
    note = "Implement `BusTraits` (or use `#[busway::bus(...)]`) to declare the interface and id type."
)]
pub trait BusTraits: Sized + Send + Sync + 'static {
    /// The capability interface handlers implement, usually `dyn SomeTrait`.
    type Interface: ?Sized + Send + Sync + 'static;

    /// The address id. Use `()` for single-address buses.
    type Id: BusId;

    /// Addressing cardinality.
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::Single;

    /// Handler cardinality per address.
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Multiple;

    /// A unique, human readable signature used in logs and errors.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Table order for [`AddressPolicy::ByIdAndOrdered`]; `Less` sorts `a`
    /// first. The default treats every id as equal, which keeps creation
    /// order.
    ///
    /// Runs while the address table is being updated and must not call
    /// back into the bus.
    fn compare_ids(_a: &Self::Id, _b: &Self::Id) -> Ordering {
        Ordering::Equal
    }

    /// Handler order for [`HandlerPolicy::MultipleAndOrdered`]; `Less`
    /// places `a` before `b`. The default keeps connection order.
    ///
    /// A handler whose implementation cannot be reached yet when it
    /// connects (for example from inside [`std::sync::Arc::new_cyclic`]) is
    /// appended at the tail.
    fn compare_handlers(_a: &Self::Interface, _b: &Self::Interface) -> Ordering {
        Ordering::Equal
    }

    /// Runs after `handler` was connected at `id`, under the bus lock and
    /// with `id` as the current address. The handler may already be called
    /// here, and the hook may call back into the bus.
    ///
    /// Skipped when the implementation cannot be reached yet.
    fn on_connect(_handler: &Self::Interface, _id: &Self::Id) {}

    /// Runs before `handler` leaves `id`, under the bus lock and with `id` as
    /// the current address.
    ///
    /// Skipped when the implementation was already dropped.
    fn on_disconnect(_handler: &Self::Interface, _id: &Self::Id) {}
}
