//! Binary-logistic gradient-boosted trees.
//!
//! - `Tree` / `Node`: flat node arrays, root at index 0.
//! - `GbdtModel`: bias (log-odds) plus the sum of tree outputs, squashed by a sigmoid.
//! - `cart`: exact-greedy tree construction used by the trainer.

pub mod cart;

use serde::{Deserialize, Serialize};

use cart::goes_left;

/// One tree node. Leaves carry the already shrunk output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Raw (margin) output for one feature row.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut at = 0;
        loop {
            match self.nodes.get(at) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().unwrap_or(f64::NAN);
                    at = if goes_left(x, *threshold) { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], at: usize) -> usize {
            match nodes.get(at) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fitted boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    /// Initial log-odds of the positive class.
    pub bias: f64,
    pub trees: Vec<Tree>,
    pub feature_count: usize,
}

impl GbdtModel {
    /// Margin: bias plus every tree's output.
    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.bias + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Probability of participation for one encoded row.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }

    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }
}
