//! CART regression tree
//!
//! Nodes live in a flat arena indexed by position, so a fitted tree
//! serializes as a plain list regardless of its depth.

use crate::error::{PricerError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Features considered at each split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least one
    Sqrt,
    All,
}

impl MaxFeatures {
    fn count(&self, available: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((available as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => available,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// `None` grows until leaves are pure or too small to split
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            n_features: 0,
            nodes: Vec::new(),
        }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 1,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    /// Fit on every row and every feature
    pub fn fit(&mut self, x: &Array2<f64>, y: &[f64]) -> Result<()> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let features: Vec<usize> = (0..x.ncols()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        self.fit_subset(x, y, rows, &features, &mut rng)
    }

    /// Fit on a subset of rows (repeats allowed, for bootstrap samples)
    /// restricted to the given feature columns.
    pub fn fit_subset(
        &mut self,
        x: &Array2<f64>,
        y: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PricerError::Training(format!(
                "dimension mismatch: {} rows, {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if rows.is_empty() {
            return Err(PricerError::Training("no rows to grow a tree on".to_string()));
        }

        self.n_features = x.ncols();
        self.nodes.clear();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(0, rows, 0)];
        while let Some((slot, rows, depth)) = stack.pop() {
            let value = mean_of(y, &rows);
            let can_split = rows.len() >= self.params.min_samples_split.max(2)
                && self.params.max_depth.map_or(true, |d| depth < d)
                && !is_constant(y, &rows);

            let best = if can_split {
                self.best_split(x, y, &rows, features, rng)
            } else {
                None
            };

            match best {
                Some(c) => {
                    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                        rows.into_iter().partition(|&r| x[[r, c.feature]] <= c.threshold);
                    let left = self.nodes.len();
                    let right = left + 1;
                    self.nodes.push(Node::Leaf { value: 0.0 });
                    self.nodes.push(Node::Leaf { value: 0.0 });
                    self.nodes[slot] = Node::Split {
                        feature: c.feature,
                        threshold: c.threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_rows, depth + 1));
                    stack.push((left, left_rows, depth + 1));
                }
                None => self.nodes[slot] = Node::Leaf { value },
            }
        }
        Ok(())
    }

    /// Best variance-reducing split over a random draw of `max_features` columns.
    /// Each column is scanned once in sorted order with running sums.
    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &[f64],
        rows: &[usize],
        features: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<Candidate> {
        let k = self.params.max_features.count(features.len());
        let drawn: Vec<usize> = if k < features.len() {
            features.choose_multiple(rng, k).copied().collect()
        } else {
            features.to_vec()
        };

        let n = rows.len();
        let total: f64 = rows.iter().map(|&r| y[r]).sum();
        let parent = total * total / n as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<Candidate> = None;
        let mut order: Vec<usize> = rows.to_vec();
        for &f in &drawn {
            order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += y[order[i]];
                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let here = x[[order[i], f]];
                let next = x[[order[i + 1], f]];
                if here == next {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / n_left as f64
                    + right_sum * right_sum / n_right as f64
                    - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(Candidate {
                        feature: f,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.nodes.is_empty() {
            return Err(PricerError::Prediction("tree is not fitted".to_string()));
        }
        if x.ncols() != self.n_features {
            return Err(PricerError::Prediction(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }
}

fn mean_of(y: &[f64], rows: &[usize]) -> f64 {
    rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len() as f64
}

fn is_constant(y: &[f64], rows: &[usize]) -> bool {
    let first = y[rows[0]];
    rows.iter().all(|&r| y[r] == first)
}
