// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;

use fherate_fhevm::DecryptedRating;
use serde::Serialize;

/// Aggregates of one rating dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionStatistics {
    pub dimension: String,
    /// 0.0 when nobody rated
    pub average: f64,
    pub min: Option<u64>,
    pub max: Option<u64>,
    /// score -> number of raters who gave it
    pub distribution: BTreeMap<u64, usize>,
    /// Scores in ledger order
    pub scores: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityStatistics {
    pub total_ratings: usize,
    pub dimensions: Vec<DimensionStatistics>,
}

impl ActivityStatistics {
    /// Aggregate decrypted ratings per dimension. A rating with fewer scores
    /// than dimensions only counts towards the dimensions it has.
    pub fn compute(dimensions: &[String], ratings: &[DecryptedRating]) -> Self {
        let dimensions = dimensions
            .iter()
            .enumerate()
            .map(|(index, dimension)| {
                let scores: Vec<u64> = ratings
                    .iter()
                    .filter_map(|rating| rating.scores.get(index).copied())
                    .collect();
                DimensionStatistics::compute(dimension, scores)
            })
            .collect();
        Self {
            total_ratings: ratings.len(),
            dimensions,
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&DimensionStatistics> {
        self.dimensions.iter().find(|d| d.dimension == name)
    }
}

impl DimensionStatistics {
    fn compute(dimension: &str, scores: Vec<u64>) -> Self {
        let mut distribution = BTreeMap::new();
        for score in &scores {
            *distribution.entry(*score).or_insert(0) += 1;
        }
        let average = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64
        };
        Self {
            dimension: dimension.to_string(),
            average,
            min: scores.iter().min().copied(),
            max: scores.iter().max().copied(),
            distribution,
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn rating(scores: &[u64]) -> DecryptedRating {
        DecryptedRating {
            rater: Address::ZERO,
            scores: scores.to_vec(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_per_dimension_aggregates() {
        let dimensions = vec!["Taste".to_string(), "Service".to_string()];
        let stats = ActivityStatistics::compute(&dimensions, &[rating(&[8, 7]), rating(&[9, 10])]);

        assert_eq!(stats.total_ratings, 2);
        let taste = stats.dimension("Taste").unwrap();
        assert_eq!(taste.average, 8.5);
        assert_eq!((taste.min, taste.max), (Some(8), Some(9)));
        assert_eq!(taste.scores, vec![8, 9]);
        let service = stats.dimension("Service").unwrap();
        assert_eq!(service.average, 8.5);
        assert_eq!(service.distribution, BTreeMap::from([(7, 1), (10, 1)]));
    }

    #[test]
    fn test_distribution_counts_repeats() {
        let dimensions = vec!["Overall".to_string()];
        let stats = ActivityStatistics::compute(
            &dimensions,
            &[rating(&[3]), rating(&[5]), rating(&[3])],
        );
        let overall = &stats.dimensions[0];
        assert_eq!(overall.distribution, BTreeMap::from([(3, 2), (5, 1)]));
        assert!((overall.average - 11.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_ratings() {
        let dimensions = vec!["Overall".to_string()];
        let stats = ActivityStatistics::compute(&dimensions, &[]);
        assert_eq!(stats.total_ratings, 0);
        assert_eq!(stats.dimensions[0].average, 0.0);
        assert_eq!(stats.dimensions[0].min, None);
        assert!(stats.dimensions[0].distribution.is_empty());
    }
}
