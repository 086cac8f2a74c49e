//! Opaque identities for subscribers and routers.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_HANDLER: AtomicU64 = AtomicU64::new(1);
static NEXT_ROUTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one subscriber connection.
///
/// Keys are process-unique and never reused, so a stale key can never
/// accidentally name a different subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey(u64);

impl HandlerKey {
    /// Allocate a fresh key.
    pub fn next() -> Self {
        Self(NEXT_HANDLER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Identity of one router registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterKey(u64);

impl RouterKey {
    /// Allocate a fresh key.
    pub fn next() -> Self {
        Self(NEXT_ROUTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "router#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        let a = HandlerKey::next();
        let b = HandlerKey::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert_eq!(a.to_string(), format!("handler#{}", a.get()));
    }

    #[test]
    fn test_router_keys_independent() {
        let r = RouterKey::next();
        assert!(r.to_string().starts_with("router#"));
    }
}
