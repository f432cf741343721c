use std::collections::HashMap;

use super::{check_weight, duplicate, unknown, SampleKey, WeightedSampler};
use crate::error::SamplerError;
use crate::random::RandomSource;

/// Flat sampler: parallel element/weight arrays plus a running cumulative
/// sum searched by bisection.
#[derive(Debug, Clone)]
pub struct WeightedList<T> {
    elements: Vec<T>,
    weights: Vec<f64>,
    /// `cumulative[i]` is the sum of `weights[..=i]`.
    cumulative: Vec<f64>,
    index: HashMap<T, usize>,
}

impl<T> Default for WeightedList<T> {
    fn default() -> Self {
        WeightedList {
            elements: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: SampleKey> WeightedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    fn rebuild_from(&mut self, start: usize) {
        let mut running = if start == 0 { 0.0 } else { self.cumulative[start - 1] };
        for i in start..self.weights.len() {
            running += self.weights[i];
            self.cumulative[i] = running;
        }
    }
}

impl<T: SampleKey> WeightedSampler<T> for WeightedList<T> {
    fn add(&mut self, element: T, weight: f64) -> Result<(), SamplerError> {
        check_weight(weight)?;
        if self.index.contains_key(&element) {
            return Err(duplicate(&element));
        }
        let running = self.cumulative.last().copied().unwrap_or(0.0) + weight;
        self.index.insert(element.clone(), self.elements.len());
        self.elements.push(element);
        self.weights.push(weight);
        self.cumulative.push(running);
        Ok(())
    }

    fn random_element(&self, rng: &mut RandomSource) -> Option<&T> {
        if self.elements.is_empty() {
            return None;
        }
        let point = rng.next_double() * self.total_weight();
        let i = self.cumulative.partition_point(|&c| c <= point);
        self.elements.get(i.min(self.elements.len() - 1))
    }

    fn update(&mut self, element: &T, weight: f64) -> Result<(), SamplerError> {
        check_weight(weight)?;
        let i = *self.index.get(element).ok_or_else(|| unknown(element))?;
        self.weights[i] = weight;
        self.rebuild_from(i);
        Ok(())
    }

    fn weight(&self, element: &T) -> Option<f64> {
        self.index.get(element).map(|&i| self.weights[i])
    }

    fn total_weight(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn len(&self) -> usize {
        self.elements.len()
    }
}
