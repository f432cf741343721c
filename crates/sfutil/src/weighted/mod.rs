//! Weighted random selection.
//!
//! Two interchangeable samplers with the same distribution: [`WeightedList`]
//! keeps a cumulative array (O(log n) draw, O(n) update) and [`WeightedTree`]
//! keeps subtree sums in an implicit binary tree (O(log n) draw and update).

mod list;
mod tree;

use std::fmt::Debug;
use std::hash::Hash;

pub use list::WeightedList;
pub use tree::WeightedTree;

use crate::error::SamplerError;
use crate::random::RandomSource;

pub trait WeightedSampler<T> {
    /// Insert a new element. Fails on a non-positive or non-finite weight,
    /// or if the element is already present.
    fn add(&mut self, element: T, weight: f64) -> Result<(), SamplerError>;

    /// Draw an element with probability proportional to its weight.
    /// Consumes exactly one value from `rng` when non-empty.
    fn random_element(&self, rng: &mut RandomSource) -> Option<&T>;

    /// Replace the weight of an existing element.
    fn update(&mut self, element: &T, weight: f64) -> Result<(), SamplerError>;

    fn weight(&self, element: &T) -> Option<f64>;

    fn total_weight(&self) -> f64;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_weight(weight: f64) -> Result<(), SamplerError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(SamplerError::InvalidWeight(weight))
    }
}

fn duplicate<T: Debug>(element: &T) -> SamplerError {
    SamplerError::DuplicateElement(format!("{element:?}"))
}

fn unknown<T: Debug>(element: &T) -> SamplerError {
    SamplerError::UnknownElement(format!("{element:?}"))
}

/// Bound shared by both samplers.
pub trait SampleKey: Eq + Hash + Clone + Debug {}

impl<T: Eq + Hash + Clone + Debug> SampleKey for T {}
