//! Stability detection for value-producing reads.

/// One read result.
///
/// [`Reading::UNSTABLE`] lets a read force another round, e.g. while the
/// page is still loading: it never equals any other reading, itself included.
#[derive(Debug, Clone)]
pub enum Reading<T> {
    Value(T),
    Unstable,
}

impl<T> Reading<T> {
    pub const UNSTABLE: Self = Reading::Unstable;

    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(value) => Some(value),
            Reading::Unstable => None,
        }
    }
}

impl<T> From<T> for Reading<T> {
    fn from(value: T) -> Self {
        Reading::Value(value)
    }
}

impl<T: PartialEq> PartialEq for Reading<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reading::Value(a), Reading::Value(b)) => a == b,
            _ => false,
        }
    }
}

/// Remembers the previous reading and reports when two in a row match.
#[derive(Debug, Clone)]
pub struct StabilityTracker<T> {
    previous: Option<Reading<T>>,
}

impl<T> Default for StabilityTracker<T> {
    fn default() -> Self {
        Self { previous: None }
    }
}

impl<T: PartialEq> StabilityTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` and return whether it equals the previous reading.
    pub fn observe(&mut self, current: Reading<T>) -> bool {
        let stable = self
            .previous
            .as_ref()
            .is_some_and(|previous| *previous == current);
        self.previous = Some(current);
        stable
    }

    pub fn previous(&self) -> Option<&Reading<T>> {
        self.previous.as_ref()
    }
}
