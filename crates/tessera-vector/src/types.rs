//! Core types for the search index

use serde::{Deserialize, Serialize};

/// Dense vector representation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    /// Vector dimensions
    pub dimensions: usize,
    /// Vector data
    pub data: Vec<f32>,
}

impl Vector {
    /// Create a new vector
    pub fn new(data: Vec<f32>) -> Self {
        let dimensions = data.len();
        Self { dimensions, data }
    }

    /// All-zero vector of the given size
    pub fn zeros(dimensions: usize) -> Self {
        Self::new(vec![0.0; dimensions])
    }

    pub fn magnitude(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|x| *x == 0.0)
    }

    /// Scale to unit length; zero vectors are left alone
    pub fn normalize(&mut self) {
        let magnitude = self.magnitude();
        if magnitude > 0.0 {
            for x in &mut self.data {
                *x /= magnitude;
            }
        }
    }

    /// Calculate cosine similarity with another vector
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.dimensions != other.dimensions {
            return 0.0;
        }

        let dot: f32 = self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum();
        let mag_a = self.magnitude();
        let mag_b = other.magnitude();

        if mag_a == 0.0 || mag_b == 0.0 {
            0.0
        } else {
            (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
        }
    }
}

/// One ranked match from the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Entry id
    pub id: String,
    /// Cosine similarity to the query
    pub score: f32,
    /// Insertion order of the entry, used to break score ties
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let a = Vector::new(vec![1.0, 2.0, 0.0]);
        let b = Vector::new(vec![2.0, 4.0, 0.0]);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_zero_and_mismatched_vectors() {
        let a = Vector::new(vec![1.0, 0.0]);
        assert_eq!(a.cosine_similarity(&Vector::zeros(2)), 0.0);
        assert_eq!(a.cosine_similarity(&Vector::new(vec![1.0, 0.0, 0.0])), 0.0);
    }

    #[test]
    fn normalize_yields_unit_length() {
        let mut v = Vector::new(vec![3.0, 4.0]);
        v.normalize();
        assert!((v.magnitude() - 1.0).abs() < 1e-6);

        let mut zero = Vector::zeros(3);
        zero.normalize();
        assert!(zero.is_zero());
    }
}
