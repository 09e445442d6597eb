//! Cost vectors: the per-rule token costs a single request imposes.
//!
//! A cost vector typically names one to four rules, so it is stored as a
//! flat `Vec` of `(id, cost)` pairs and searched linearly; at this size a
//! linear scan beats hashing.

use serde::Serialize;

/// A finite mapping from rule id to nonnegative token cost.
///
/// An empty vector is legal: such a request still queues in FIFO order but
/// consumes no tokens when admitted.
///
/// # Panics
///
/// Inserting a negative or non-finite cost is a programmer error and
/// panics; costs are never silently normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CostVector(Vec<(String, f64)>);

impl CostVector {
    /// An empty cost vector.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Set the cost for a rule, replacing any previous entry for the id.
    pub fn insert(&mut self, id: impl Into<String>, cost: f64) {
        assert!(
            cost.is_finite() && cost >= 0.0,
            "cost for a throttle rule must be finite and nonnegative, got {cost}"
        );
        let id = id.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = cost,
            None => self.0.push((id, cost)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, id: impl Into<String>, cost: f64) -> Self {
        self.insert(id, cost);
        self
    }

    /// Look up the cost for a rule id.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, cost)| *cost)
    }

    /// Iterate over `(id, cost)` entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(id, cost)| (id.as_str(), *cost))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for CostVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut cost = CostVector::new();
        for (id, amount) in iter {
            cost.insert(id, amount);
        }
        cost
    }
}

impl<S: Into<String>, const N: usize> From<[(S, f64); N]> for CostVector {
    fn from(entries: [(S, f64); N]) -> Self {
        entries.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let cost = CostVector::from([("weight", 5.0), ("orders", 1.0)]);
        assert_eq!(cost.get("weight"), Some(5.0));
        assert_eq!(cost.get("orders"), Some(1.0));
        assert_eq!(cost.get("raw"), None);
        assert_eq!(cost.len(), 2);
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let cost = CostVector::new().with("weight", 1.0).with("weight", 3.0);
        assert_eq!(cost.get("weight"), Some(3.0));
        assert_eq!(cost.len(), 1);
    }

    #[test]
    fn empty_vector() {
        let cost = CostVector::new();
        assert!(cost.is_empty());
        assert_eq!(cost.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "nonnegative")]
    fn negative_cost_panics() {
        CostVector::new().with("weight", -1.0);
    }

    #[test]
    #[should_panic(expected = "finite")]
    fn nan_cost_panics() {
        CostVector::new().with("weight", f64::NAN);
    }
}
