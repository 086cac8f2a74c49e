//! Result combine policies for `EventResult` / `BroadcastResult`.
//!
//! Each handler invoked by a result-returning dispatch produces one value;
//! a [`ResultPolicy`] folds those values into the caller's accumulator.
//! The policy belongs to the caller, not to the bus.

/// Folds handler return values into an accumulator.
pub trait ResultPolicy<R> {
    /// Accept the value returned by one handler.
    fn accept(&mut self, value: R);
}

/// Collect every value in visitation order.
impl<R> ResultPolicy<R> for Vec<R> {
    fn accept(&mut self, value: R) {
        self.push(value);
    }
}

/// Keep only the value returned by the last handler visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepLast<R> {
    value: Option<R>,
}

impl<R> KeepLast<R> {
    /// Start with no value.
    pub const fn new() -> Self {
        Self { value: None }
    }

    /// Start with a default that survives when no handler answers.
    pub const fn with_default(value: R) -> Self {
        Self { value: Some(value) }
    }

    /// The last value seen, if any.
    pub fn get(&self) -> Option<&R> {
        self.value.as_ref()
    }

    /// Consume the policy and return the last value.
    pub fn into_inner(self) -> Option<R> {
        self.value
    }
}

impl<R> Default for KeepLast<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResultPolicy<R> for KeepLast<R> {
    fn accept(&mut self, value: R) {
        self.value = Some(value);
    }
}

/// Fold values with a binary operator, `acc = op(acc, value)`.
#[derive(Debug, Clone)]
pub struct Reduce<R, F> {
    value: R,
    op: F,
}

impl<R, F> Reduce<R, F>
where
    F: FnMut(R, R) -> R,
{
    /// Start from `init` and fold with `op`.
    pub const fn new(init: R, op: F) -> Self {
        Self { value: init, op }
    }

    /// The current accumulated value.
    pub fn value(&self) -> &R {
        &self.value
    }

    /// Consume the policy and return the accumulated value.
    pub fn into_inner(self) -> R {
        self.value
    }
}

impl Reduce<bool, fn(bool, bool) -> bool> {
    /// Logical OR over all answers, starting from `init`.
    pub fn or(init: bool) -> Self {
        Self::new(init, |a, b| a || b)
    }

    /// Logical AND over all answers, starting from `init`.
    pub fn and(init: bool) -> Self {
        Self::new(init, |a, b| a && b)
    }
}

impl<R, F> ResultPolicy<R> for Reduce<R, F>
where
    R: Default,
    F: FnMut(R, R) -> R,
{
    fn accept(&mut self, value: R) {
        let acc = std::mem::take(&mut self.value);
        self.value = (self.op)(acc, value);
    }
}

/// Collect every value, like `Vec<R>`, with a few read helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate<R> {
    values: Vec<R>,
}

impl<R> Aggregate<R> {
    /// Start empty.
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Values in visitation order.
    pub fn values(&self) -> &[R] {
        &self.values
    }

    /// Number of answers received.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no handler answered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume and return the values.
    pub fn into_inner(self) -> Vec<R> {
        self.values
    }
}

impl<R> Default for Aggregate<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResultPolicy<R> for Aggregate<R> {
    fn accept(&mut self, value: R) {
        self.values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_last() {
        let mut last = KeepLast::new();
        assert_eq!(last.get(), None);
        last.accept(1);
        last.accept(2);
        assert_eq!(last.into_inner(), Some(2));

        let untouched = KeepLast::with_default(9);
        assert_eq!(untouched.get(), Some(&9));
    }

    #[test]
    fn test_reduce_or_and() {
        let mut any = Reduce::or(false);
        any.accept(false);
        any.accept(true);
        any.accept(false);
        assert!(any.into_inner());

        let mut all = Reduce::and(true);
        all.accept(true);
        all.accept(false);
        assert!(!all.into_inner());
    }

    #[test]
    fn test_reduce_custom_sum() {
        let mut sum = Reduce::new(0u32, |a, b| a + b);
        for v in [1, 2, 3] {
            sum.accept(v);
        }
        assert_eq!(*sum.value(), 6);
    }

    #[test]
    fn test_aggregate_and_vec() {
        let mut agg = Aggregate::new();
        agg.accept("a");
        agg.accept("b");
        assert_eq!(agg.values(), ["a", "b"]);
        assert_eq!(agg.len(), 2);

        let mut v: Vec<u8> = Vec::new();
        v.accept(3);
        assert_eq!(v, vec![3]);
    }
}
