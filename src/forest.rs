//! Random forest regressor
//!
//! Bootstrap-aggregated regression trees grown with a squared-error
//! criterion. Every tree owns a ChaCha8 stream seeded from the forest seed and
//! its index, so a fit is fully reproducible.

use log::debug;
use rand::Rng;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::TrainingConfig;
use crate::error::{HydrateError, Result};

/// Random forest configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree (unlimited if None)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features tried per split (all if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl From<&TrainingConfig> for ForestConfig {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            seed: config.seed,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
enum Node {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree stored as a flat node arena; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    feature_importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    child_sse: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

// NaN sorts after every number, matching `x <= threshold` sending it right
fn cmp_feature(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

fn sse(y: &[f64], indices: &[usize]) -> (f64, f64) {
    let n = indices.len() as f64;
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n;
    let sse = indices.iter().map(|&i| (y[i] - mean).powi(2)).sum();
    (mean, sse)
}

impl RegressionTree {
    /// Grow a tree on the rows named by `indices` (duplicates allowed)
    fn grow(
        x: &[Vec<f64>],
        y: &[f64],
        indices: Vec<usize>,
        config: &ForestConfig,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        let mut nodes = vec![Node::Leaf {
            value: 0.0,
            n_samples: 0,
        }];
        let mut importances = vec![0.0; n_features];
        let mut stack = vec![(0usize, indices, 0usize)];

        while let Some((id, indices, depth)) = stack.pop() {
            let (mean, parent_sse) = sse(y, &indices);
            let leaf = Node::Leaf {
                value: mean,
                n_samples: indices.len(),
            };

            let depth_reached = config.max_depth.is_some_and(|max| depth >= max);
            if depth_reached
                || indices.len() < config.min_samples_split
                || parent_sse <= f64::EPSILON * indices.len() as f64
            {
                nodes[id] = leaf;
                continue;
            }

            match best_split(x, y, &indices, n_features, config, rng) {
                Some(split) => {
                    importances[split.feature] += (parent_sse - split.child_sse).max(0.0);

                    let left_id = nodes.len();
                    let right_id = left_id + 1;
                    nodes.push(Node::Leaf {
                        value: 0.0,
                        n_samples: 0,
                    });
                    nodes.push(Node::Leaf {
                        value: 0.0,
                        n_samples: 0,
                    });
                    nodes[id] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_id,
                        right: right_id,
                    };
                    stack.push((right_id, split.right, depth + 1));
                    stack.push((left_id, split.left, depth + 1));
                }
                None => nodes[id] = leaf,
            }
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        RegressionTree {
            nodes,
            feature_importances: importances,
        }
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[id] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}

/// Exhaustive sorted sweep over a shuffled subset of features
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    n_features: usize,
    config: &ForestConfig,
    rng: &mut ChaCha8Rng,
) -> Option<SplitCandidate> {
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features.truncate(config.max_features.unwrap_or(n_features).clamp(1, n_features.max(1)));

    let n = indices.len();
    let min_leaf = config.min_samples_leaf.max(1);
    let node_mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
    let (total_sum, total_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &i| {
        let d = y[i] - node_mean;
        (s + d, sq + d * d)
    });

    let mut best: Option<(usize, f64, f64, usize)> = None;
    let mut best_order: Vec<usize> = Vec::new();

    for &feature in &features {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| cmp_feature(x[a][feature], x[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut improved = false;

        for k in 0..n - 1 {
            let d = y[order[k]] - node_mean;
            left_sum += d;
            left_sq += d * d;

            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }

            let lo = x[order[k]][feature];
            let hi = x[order[k + 1]][feature];
            if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let child_sse = (left_sq - left_sum * left_sum / n_left as f64)
                + (right_sq - right_sum * right_sum / n_right as f64);

            if best.is_none_or(|(_, _, sse, _)| child_sse < sse) {
                let mut threshold = lo / 2.0 + hi / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some((feature, threshold, child_sse, n_left));
                improved = true;
            }
        }

        if improved {
            best_order = order;
        }
    }

    best.map(|(feature, threshold, child_sse, n_left)| {
        let right = best_order.split_off(n_left);
        SplitCandidate {
            feature,
            threshold,
            child_sse: child_sse.max(0.0),
            left: best_order,
            right,
        }
    })
}

/// Random forest model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    feature_names: Vec<String>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_names: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Train the forest on a row-major feature matrix
    ///
    /// # Errors
    /// * `ComputeFailure` if the matrix is empty, ragged, or mismatched with `y`
    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64], feature_names: &[&str]) -> Result<()> {
        if x.is_empty() {
            return Err(HydrateError::compute("Cannot train a forest on zero rows"));
        }
        if x.len() != y.len() {
            return Err(HydrateError::compute(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        let n_features = feature_names.len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(HydrateError::compute("Feature rows do not match the feature names"));
        }

        let n = x.len();
        self.feature_names = feature_names.iter().map(|s| s.to_string()).collect();
        self.trees = (0..self.config.n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let indices: Vec<usize> = if self.config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::grow(x, y, indices, &self.config, &mut rng)
            })
            .collect();

        self.feature_importances = vec![0.0; n_features];
        for tree in &self.trees {
            for (total, imp) in self.feature_importances.iter_mut().zip(&tree.feature_importances) {
                *total += imp;
            }
        }
        let sum: f64 = self.feature_importances.iter().sum();
        if sum > 0.0 {
            self.feature_importances.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(
            "Forest fitted: {} trees, mean depth {:.1}",
            self.trees.len(),
            self.trees.iter().map(|t| t.depth() as f64).sum::<f64>() / self.trees.len() as f64
        );
        Ok(())
    }

    /// Predict for a single sample (mean over trees)
    pub fn predict_one(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_one(features)).sum::<f64>() / self.trees.len() as f64
    }

    /// Predict for multiple samples
    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_one(row)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Feature names with importances, most important first
    pub fn feature_importance_ranking(&self) -> Vec<(&str, f64)> {
        let mut ranking: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .zip(self.feature_importances.iter())
            .map(|(n, &i)| (n.as_str(), i))
            .collect();

        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, ((i * 7) % 11) as f64]).collect();
        let y: Vec<f64> = (0..60).map(|i| if i < 30 { 1.0 } else { 8.0 }).collect();
        (x, y)
    }

    #[test]
    fn single_tree_learns_a_step_exactly() {
        let (x, y) = step_data();
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = RegressionTree::grow(&x, &y, (0..60).collect(), &config, &mut rng);

        assert_eq!(tree.predict_one(&[3.0, 0.0]), 1.0);
        assert_eq!(tree.predict_one(&[45.0, 0.0]), 8.0);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn forest_regression_fits_training_data() {
        let x: Vec<Vec<f64>> = (0..200)
            .map(|i| vec![i as f64 / 20.0, (i as f64 / 10.0).sin()])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] + 2.0 * r[1]).collect();

        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        forest.fit(&x, &y, &["x1", "x2"]).unwrap();

        assert_eq!(forest.n_trees(), 10);
        let mse = forest
            .predict(&x)
            .iter()
            .zip(&y)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        assert!(mse < 0.1, "mse {}", mse);

        let total: f64 = forest.feature_importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(forest.feature_importance_ranking()[0].0, "x1");
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = step_data();
        let mut a = RandomForest::new(ForestConfig {
            n_trees: 5,
            ..Default::default()
        });
        let mut b = a.clone();
        a.fit(&x, &y, &["a", "b"]).unwrap();
        b.fit(&x, &y, &["a", "b"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_finite_inputs_route_right() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0.0, 0.0, 10.0, 10.0];
        let mut forest = RandomForest::new(ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..Default::default()
        });
        forest.fit(&x, &y, &["v"]).unwrap();

        assert_eq!(forest.predict_one(&[f64::INFINITY]), 10.0);
        assert_eq!(forest.predict_one(&[f64::NAN]), 10.0);
        assert_eq!(forest.predict_one(&[f64::NEG_INFINITY]), 0.0);
    }

    #[test]
    fn rejects_mismatched_input() {
        let mut forest = RandomForest::new(ForestConfig::default());
        assert!(forest.fit(&[], &[], &["a"]).is_err());
        assert!(forest.fit(&[vec![1.0]], &[1.0, 2.0], &["a"]).is_err());
        assert!(forest.fit(&[vec![1.0, 2.0]], &[1.0], &["a"]).is_err());
    }
}
