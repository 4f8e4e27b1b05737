//! DR projection output and feature contributions

use serde::{Deserialize, Serialize};

use super::{ClusterId, EntityId};

/// One entity's position in the 2-D DR projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrPoint {
    pub entity: EntityId,
    pub x: f64,
    pub y: f64,
    pub cluster: ClusterId,
}

/// Contribution of one feature to one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub cluster: ClusterId,
    pub value: f64,
}

/// Per-feature, per-cluster contribution weights.
///
/// `features` and `order_col` are authoritative for shape. The weight matrix
/// may have fewer rows than `features` when it was computed on an older,
/// smaller feature set; lookups past the last row yield no contributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContributionMatrix {
    pub features: Vec<String>,
    pub order_col: Vec<ClusterId>,
    pub weights: Vec<Vec<f64>>,
}

impl FeatureContributionMatrix {
    pub fn row_index(&self, feature: &str) -> Option<usize> {
        self.features.iter().position(|f| f == feature)
    }

    /// Cell at `(row, cluster)`; the cluster id indexes the row directly.
    pub fn cell(&self, row: usize, cluster: ClusterId) -> Option<f64> {
        let col = usize::try_from(cluster).ok()?;
        self.weights.get(row)?.get(col).copied()
    }

    /// Contributions of `feature` to each cluster in `order_col` order.
    ///
    /// Empty when the feature is unknown or its row index is past the end of
    /// the weight matrix. Never falls back to another feature's row.
    pub fn contributions(&self, feature: &str) -> Vec<Contribution> {
        let Some(row) = self.row_index(feature) else {
            return Vec::new();
        };
        if row >= self.weights.len() {
            return Vec::new();
        }
        self.order_col
            .iter()
            .filter_map(|&cluster| {
                self.cell(row, cluster)
                    .map(|value| Contribution { cluster, value })
            })
            .collect()
    }

    /// Features listed without a corresponding matrix row.
    pub fn missing_rows(&self) -> &[String] {
        let rows = self.weights.len().min(self.features.len());
        &self.features[rows..]
    }

    /// Largest absolute weight, used to normalise colour intensity.
    pub fn max_abs_weight(&self) -> f64 {
        self.weights
            .iter()
            .flatten()
            .fold(0.0_f64, |acc, w| acc.max(w.abs()))
    }
}

/// A complete DR fetch: points plus the optional contribution matrix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrSnapshot {
    pub points: Vec<DrPoint>,
    pub contributions: Option<FeatureContributionMatrix>,
}

impl DrSnapshot {
    pub fn point(&self, entity: &EntityId) -> Option<&DrPoint> {
        self.points.iter().find(|p| &p.entity == entity)
    }

    pub fn cluster_of(&self, entity: &EntityId) -> Option<ClusterId> {
        self.point(entity).map(|p| p.cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FeatureContributionMatrix {
        FeatureContributionMatrix {
            features: vec!["a".into(), "b".into(), "c".into()],
            order_col: vec![0, 1],
            weights: vec![vec![0.1, 0.2], vec![0.3, 0.4]],
        }
    }

    #[test]
    fn test_contributions_follow_order_col() {
        let mut m = matrix();
        m.order_col = vec![1, 0];
        let bars = m.contributions("b");
        assert_eq!(
            bars,
            vec![
                Contribution { cluster: 1, value: 0.4 },
                Contribution { cluster: 0, value: 0.3 },
            ]
        );
    }

    #[test]
    fn test_row_past_matrix_end_is_empty() {
        let m = matrix();
        assert!(m.contributions("c").is_empty());
        assert_eq!(m.missing_rows(), &["c".to_string()]);
    }

    #[test]
    fn test_unknown_feature_is_empty() {
        assert!(matrix().contributions("zzz").is_empty());
    }

    #[test]
    fn test_noise_cluster_skipped() {
        let mut m = matrix();
        m.order_col = vec![-1, 0];
        let bars = m.contributions("a");
        assert_eq!(bars, vec![Contribution { cluster: 0, value: 0.1 }]);
    }

    #[test]
    fn test_max_abs_weight() {
        let mut m = matrix();
        m.weights[0][0] = -0.9;
        assert!((m.max_abs_weight() - 0.9).abs() < f64::EPSILON);
    }
}
