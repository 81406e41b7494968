//! Route selection state

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of distinct compartments that completes a route
pub const ROUTE_SIZE: usize = 3;

/// Where route selection state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteScope {
    /// Each client session tracks its own selection
    #[default]
    Session,
    /// One selection shared by every session
    Gateway,
}

/// Result of staging a compartment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// Compartment added, route still incomplete
    Added,
    /// Compartment was already selected
    Duplicate,
    /// This compartment completed the route
    Ready,
}

/// Distinct compartments already assigned for the current route
#[derive(Debug, Clone, Default)]
pub struct RouteSelectionSet {
    compartments: BTreeSet<u8>,
}

impl RouteSelectionSet {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compartment
    ///
    /// [`PlaceOutcome::Ready`] is returned only by the insertion that brings
    /// the set to [`ROUTE_SIZE`] members.
    pub fn place(&mut self, compartment: u8) -> PlaceOutcome {
        if !self.compartments.insert(compartment) {
            PlaceOutcome::Duplicate
        } else if self.compartments.len() == ROUTE_SIZE {
            PlaceOutcome::Ready
        } else {
            PlaceOutcome::Added
        }
    }

    /// Forget every selection
    pub fn clear(&mut self) {
        self.compartments.clear();
    }

    /// Whether the route is complete and waiting for a start
    pub fn is_ready(&self) -> bool {
        self.compartments.len() >= ROUTE_SIZE
    }

    /// Number of distinct compartments selected
    pub fn len(&self) -> usize {
        self.compartments.len()
    }

    /// Whether nothing is selected
    pub fn is_empty(&self) -> bool {
        self.compartments.is_empty()
    }

    /// Selected compartments in ascending order
    pub fn compartments(&self) -> impl Iterator<Item = u8> + '_ {
        self.compartments.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_third_distinct() {
        let mut route = RouteSelectionSet::new();
        assert_eq!(route.place(1), PlaceOutcome::Added);
        assert_eq!(route.place(2), PlaceOutcome::Added);
        assert!(!route.is_ready());
        assert_eq!(route.place(3), PlaceOutcome::Ready);
        assert!(route.is_ready());
    }

    #[test]
    fn test_duplicates_do_not_grow_or_retrigger() {
        let mut route = RouteSelectionSet::new();
        route.place(2);
        assert_eq!(route.place(2), PlaceOutcome::Duplicate);
        assert_eq!(route.len(), 1);

        route.place(1);
        assert_eq!(route.place(3), PlaceOutcome::Ready);
        assert_eq!(route.place(3), PlaceOutcome::Duplicate);
        assert_eq!(route.place(1), PlaceOutcome::Duplicate);
        assert_eq!(route.len(), 3);
    }

    #[test]
    fn test_clear_resets() {
        let mut route = RouteSelectionSet::new();
        route.clear();
        assert!(route.is_empty());

        for compartment in [3, 1, 2] {
            route.place(compartment);
        }
        route.clear();
        assert!(route.is_empty());
        assert!(!route.is_ready());
        assert_eq!(route.place(1), PlaceOutcome::Added);
    }

    #[test]
    fn test_compartments_sorted() {
        let mut route = RouteSelectionSet::new();
        route.place(3);
        route.place(1);
        assert_eq!(route.compartments().collect::<Vec<_>>(), vec![1, 3]);
    }
}
