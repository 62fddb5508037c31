//! Bagged regression forest.
//!
//! Exact-greedy CART trees grown on bootstrap samples drawn from a seeded
//! RNG, so training the same data twice produces the same model. Splits
//! minimize the within-node sum of squared errors; a leaf predicts the mean
//! target of its samples, and the forest prediction is the mean over trees.

use linfa::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, Ix1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 12,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Node {
    feature: usize,
    threshold: f64,
    left: u32,
    right: u32,
    value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if let Some(value) = node.value {
                return value;
            }
            idx = if row[node.feature] <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<Tree>,
}

impl RandomForest {
    /// Grow the configured number of trees on bootstrap samples of the
    /// dataset. Deterministic for a given config and input.
    pub fn fit(dataset: &Dataset<f64, f64, Ix1>, config: &ForestConfig) -> Self {
        let records = dataset.records();
        let targets = dataset.targets();
        let n = records.nrows();
        if n == 0 {
            return Self { trees: Vec::new() };
        }
        let mut rng = StdRng::seed_from_u64(config.seed);

        let builder = TreeBuilder {
            records,
            targets,
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf.max(1),
        };

        let mut trees = Vec::with_capacity(config.n_trees);
        for _ in 0..config.n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(builder.grow(&sample));
        }

        Self { trees }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn predict(&self, records: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter(records.rows().into_iter().map(|row| self.predict_row(row)))
    }
}

struct TreeBuilder<'a> {
    records: &'a Array2<f64>,
    targets: &'a Array1<f64>,
    max_depth: usize,
    min_samples_leaf: usize,
}

impl TreeBuilder<'_> {
    fn grow(&self, indices: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(indices, 0, &mut nodes);
        Tree { nodes }
    }

    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>) -> u32 {
        let current = nodes.len() as u32;
        let leaf_value = self.mean_target(indices);

        if depth >= self.max_depth || indices.len() < 2 * self.min_samples_leaf {
            nodes.push(Self::leaf(leaf_value));
            return current;
        }

        let Some((feature, threshold)) = self.best_split(indices) else {
            nodes.push(Self::leaf(leaf_value));
            return current;
        };

        let (left_indices, right_indices) = self.partition(indices, feature, threshold);
        if left_indices.len() < self.min_samples_leaf || right_indices.len() < self.min_samples_leaf
        {
            nodes.push(Self::leaf(leaf_value));
            return current;
        }

        nodes.push(Node {
            feature,
            threshold,
            left: 0,
            right: 0,
            value: None,
        });

        let left = self.build_node(&left_indices, depth + 1, nodes);
        let right = self.build_node(&right_indices, depth + 1, nodes);
        nodes[current as usize].left = left;
        nodes[current as usize].right = right;

        current
    }

    fn leaf(value: f64) -> Node {
        Node {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }

    /// Exact-greedy search over every feature and every boundary between
    /// distinct sorted values. Feature order and sorted scan order make the
    /// argmax deterministic; ties keep the first candidate.
    fn best_split(&self, indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len() as f64;
        let (total_sum, total_sq) = self.sums(indices);
        let parent_sse = total_sq - total_sum * total_sum / n;

        let mut best: Option<(usize, f64)> = None;
        let mut best_gain = 1e-12;

        for feature in 0..self.records.ncols() {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (self.records[[i, feature]], self.targets[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for (k, &(value, target)) in pairs.iter().enumerate().take(pairs.len() - 1) {
                left_sum += target;
                left_sq += target * target;

                let next_value = pairs[k + 1].0;
                if value >= next_value {
                    continue; // no boundary between equal values
                }
                let left_n = (k + 1) as f64;
                let right_n = n - left_n;
                if (k + 1) < self.min_samples_leaf
                    || (pairs.len() - k - 1) < self.min_samples_leaf
                {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / left_n;
                let right_sse = right_sq - right_sum * right_sum / right_n;
                let gain = parent_sse - left_sse - right_sse;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature, (value + next_value) / 2.0));
                }
            }
        }

        best
    }

    fn partition(&self, indices: &[usize], feature: usize, threshold: f64) -> (Vec<usize>, Vec<usize>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for &i in indices {
            if self.records[[i, feature]] <= threshold {
                left.push(i);
            } else {
                right.push(i);
            }
        }
        (left, right)
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        let mut sum = 0.0;
        let mut sq = 0.0;
        for &i in indices {
            let t = self.targets[i];
            sum += t;
            sq += t * t;
        }
        (sum, sq)
    }

    fn mean_target(&self, indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let (sum, _) = self.sums(indices);
        sum / indices.len() as f64
    }
}
