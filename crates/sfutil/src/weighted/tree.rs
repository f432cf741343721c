use std::collections::HashMap;

use super::{check_weight, duplicate, unknown, SampleKey, WeightedSampler};
use crate::error::SamplerError;
use crate::random::RandomSource;

/// Tree sampler over an implicit binary tree stored in an array.
///
/// Node `i` has children `2i + 1` and `2i + 2`. New elements are appended at
/// the next free slot, so the tree fills level by level (caterpillar order)
/// and stays balanced. Each node stores its own weight and the sum of its
/// subtree; a draw descends from the root choosing self, left or right.
#[derive(Debug, Clone)]
pub struct WeightedTree<T> {
    elements: Vec<T>,
    weights: Vec<f64>,
    sums: Vec<f64>,
    index: HashMap<T, usize>,
}

impl<T> Default for WeightedTree<T> {
    fn default() -> Self {
        WeightedTree {
            elements: Vec::new(),
            weights: Vec::new(),
            sums: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: SampleKey> WeightedTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    fn subtree(&self, i: usize) -> f64 {
        self.sums.get(i).copied().unwrap_or(0.0)
    }

    /// Recompute subtree sums from `i` up to the root.
    fn fix_path(&mut self, mut i: usize) {
        loop {
            self.sums[i] = self.weights[i] + self.subtree(2 * i + 1) + self.subtree(2 * i + 2);
            if i == 0 {
                break;
            }
            i = (i - 1) / 2;
        }
    }
}

impl<T: SampleKey> WeightedSampler<T> for WeightedTree<T> {
    fn add(&mut self, element: T, weight: f64) -> Result<(), SamplerError> {
        check_weight(weight)?;
        if self.index.contains_key(&element) {
            return Err(duplicate(&element));
        }
        let i = self.elements.len();
        self.index.insert(element.clone(), i);
        self.elements.push(element);
        self.weights.push(weight);
        self.sums.push(weight);
        self.fix_path(i);
        Ok(())
    }

    fn random_element(&self, rng: &mut RandomSource) -> Option<&T> {
        if self.elements.is_empty() {
            return None;
        }
        let mut point = rng.next_double() * self.total_weight();
        let mut i = 0;
        loop {
            if point < self.weights[i] {
                return self.elements.get(i);
            }
            point -= self.weights[i];
            let left = 2 * i + 1;
            let right = left + 1;
            if left < self.elements.len() && point < self.sums[left] {
                i = left;
            } else if right < self.elements.len() {
                point -= self.subtree(left);
                i = right;
            } else {
                // Rounding left `point` past the last weight on this path.
                return self.elements.get(i);
            }
        }
    }

    fn update(&mut self, element: &T, weight: f64) -> Result<(), SamplerError> {
        check_weight(weight)?;
        let i = *self.index.get(element).ok_or_else(|| unknown(element))?;
        self.weights[i] = weight;
        self.fix_path(i);
        Ok(())
    }

    fn weight(&self, element: &T) -> Option<f64> {
        self.index.get(element).map(|&i| self.weights[i])
    }

    fn total_weight(&self) -> f64 {
        self.subtree(0)
    }

    fn len(&self) -> usize {
        self.elements.len()
    }
}
