//! CART (Classification and Regression Tree) builder
//!
//! Exact-greedy regression tree on first/second order gradients. Candidate
//! thresholds are midpoints between consecutive distinct feature values;
//! missing values (`NaN`) always go to the right child.

use std::cmp::Ordering;

use super::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 penalty on leaf weights (λ).
    pub lambda: f64,
    /// Shrinkage applied to every leaf value.
    pub learning_rate: f64,
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl SplitCandidate {
    /// Higher gain wins; equal gains go to the lower (feature, threshold).
    fn beats(&self, other: &SplitCandidate) -> bool {
        match self.gain.total_cmp(&other.gain) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.threshold_cmp(other) == Ordering::Less,
        }
    }

    fn threshold_cmp(&self, other: &SplitCandidate) -> Ordering {
        self.feature
            .cmp(&other.feature)
            .then(self.threshold.total_cmp(&other.threshold))
    }
}

/// Build a regression tree using exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    config: &'a TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: &'a TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());
        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    /// Build a tree over the rows in `rows`.
    pub fn build(&self, rows: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, &mut nodes);
        Tree { nodes }
    }

    fn build_node(&self, rows: &[usize], depth: usize, nodes: &mut Vec<Node>) -> usize {
        let current = nodes.len();
        let (g, h) = self.sums(rows);
        let leaf = Node::Leaf {
            value: -g / (h + self.config.lambda) * self.config.learning_rate,
        };

        if depth >= self.config.max_depth || rows.len() < 2 * self.config.min_samples_leaf {
            nodes.push(leaf);
            return current;
        }

        let Some(split) = self.find_best_split(rows, g, h) else {
            nodes.push(leaf);
            return current;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| goes_left(self.features[i][split.feature], split.threshold));

        // Placeholder; children indices patched below.
        nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left_idx = self.build_node(&left_rows, depth + 1, nodes);
        let right_idx = self.build_node(&right_rows, depth + 1, nodes);
        if let Node::Split { left, right, .. } = &mut nodes[current] {
            *left = left_idx;
            *right = right_idx;
        }
        current
    }

    fn find_best_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let lambda = self.config.lambda;
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent = g_total * g_total / (h_total + lambda);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..self.feature_count {
            let mut present: Vec<usize> = rows
                .iter()
                .copied()
                .filter(|&i| !self.features[i][feature].is_nan())
                .collect();
            present.sort_by(|&a, &b| {
                self.features[a][feature]
                    .total_cmp(&self.features[b][feature])
                    .then(a.cmp(&b))
            });

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for (k, &i) in present.iter().enumerate() {
                g_left += self.gradients[i];
                h_left += self.hessians[i];

                let Some(&next) = present.get(k + 1) else { break };
                let here = self.features[i][feature];
                let there = self.features[next][feature];
                if here == there {
                    continue;
                }

                let n_left = k + 1;
                let n_right = rows.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                let gain = g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent;
                if !gain.is_finite() || gain <= 0.0 {
                    continue;
                }

                let candidate = SplitCandidate {
                    feature,
                    threshold: here + (there - here) / 2.0,
                    gain,
                };
                if best.as_ref().map_or(true, |b| candidate.beats(b)) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &i| {
            (g + self.gradients[i], h + self.hessians[i])
        })
    }
}

/// Routing rule shared by training and prediction.
pub(crate) fn goes_left(value: f64, threshold: f64) -> bool {
    !value.is_nan() && value <= threshold
}
