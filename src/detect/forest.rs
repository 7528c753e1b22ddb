//! Isolation forest fitted on one survey's feature vectors.
//!
//! Trees are grown on random subsamples; each split draws a feature among
//! those that still vary in the node and a threshold uniformly between the
//! node's min and max. A cell's raw score is its mean path length, with the
//! usual `c(n)` correction for leaves that were not split to singletons.
//! [`IsolationForest::isolation_scores`] maps path lengths linearly onto
//! `[0, 1]`: the shortest mean path gets 1, the longest gets 0.
use crate::config::ForestOptions;
use crate::error::QcError;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Features per sample seen by the forest.
pub const FOREST_DIMS: usize = 6;

pub type Sample = [f64; FOREST_DIMS];

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const RANGE_EPS: f64 = 1e-12;

/// Average path length of an unsuccessful BST search over `n` points.
pub(crate) fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(samples: &[Sample], mut indices: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(samples, &mut indices, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        samples: &[Sample],
        indices: &mut [usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });
        if depth >= height_limit || indices.len() <= 1 {
            return slot;
        }

        let mut lo = [f64::INFINITY; FOREST_DIMS];
        let mut hi = [f64::NEG_INFINITY; FOREST_DIMS];
        for &i in indices.iter() {
            for (f, &v) in samples[i].iter().enumerate() {
                lo[f] = lo[f].min(v);
                hi[f] = hi[f].max(v);
            }
        }
        let candidates: Vec<usize> = (0..FOREST_DIMS).filter(|&f| hi[f] > lo[f]).collect();
        if candidates.is_empty() {
            return slot;
        }

        let feature = candidates[rng.gen_range(0..candidates.len())];
        let (min, max) = (lo[feature], hi[feature]);
        let mut threshold = rng.gen_range(min..max);
        if threshold <= min {
            threshold = 0.5 * (min + max);
        }

        let split = partition(indices, |i| samples[i][feature] < threshold);
        let (left_idx, right_idx) = indices.split_at_mut(split);
        let left = self.build(samples, left_idx, depth + 1, height_limit, rng);
        let right = self.build(samples, right_idx, depth + 1, height_limit, rng);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn path_length(&self, x: &Sample) -> f64 {
        let mut node = 0usize;
        let mut depth = 0usize;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth as f64 + average_path_length(size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[feature] < threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// In-place partition; returns the number of elements satisfying `pred`,
/// which end up at the front.
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut store = 0;
    for k in 0..indices.len() {
        if pred(indices[k]) {
            indices.swap(store, k);
            store += 1;
        }
    }
    store
}

#[derive(Clone, Debug)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit a forest on `samples`. Each tree `t` draws from its own RNG seeded
    /// with `seed + t`, so the result does not depend on thread scheduling.
    pub fn fit(samples: &[Sample], opts: &ForestOptions) -> Result<Self, QcError> {
        let n = samples.len();
        if n < opts.min_fit_cells {
            return Err(QcError::ModelFit(format!(
                "{n} valid cells, at least {} required",
                opts.min_fit_cells
            )));
        }
        if let Some(pos) = samples.iter().position(|s| s.iter().any(|v| !v.is_finite())) {
            return Err(QcError::ModelFit(format!(
                "non-finite feature value in sample {pos}"
            )));
        }

        let sample_size = opts.max_samples.min(n);
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;
        let trees: Vec<IsolationTree> = (0..opts.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(t as u64));
                let indices = if sample_size < n {
                    index::sample(&mut rng, n, sample_size).into_vec()
                } else {
                    (0..n).collect()
                };
                IsolationTree::grow(samples, indices, height_limit, &mut rng)
            })
            .collect();

        debug!(
            "IsolationForest::fit samples={} trees={} sample_size={} height_limit={}",
            n,
            trees.len(),
            sample_size,
            height_limit
        );
        Ok(Self { trees, sample_size })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Mean path length of `x` across all trees.
    pub fn path_length(&self, x: &Sample) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.path_length(x)).sum();
        total / self.trees.len() as f64
    }

    /// Min-max normalised isolation scores, 1 = isolated fastest.
    ///
    /// A population whose path lengths do not vary scores 0 everywhere.
    pub fn isolation_scores(&self, samples: &[Sample]) -> Vec<f64> {
        let paths: Vec<f64> = samples.par_iter().map(|x| self.path_length(x)).collect();
        let (h_min, h_max) = paths
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| {
                (lo.min(h), hi.max(h))
            });
        let range = h_max - h_min;
        if !(range > RANGE_EPS) {
            return vec![0.0; paths.len()];
        }
        paths.iter().map(|&h| (h_max - h) / range).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ForestOptions {
        ForestOptions {
            n_trees: 64,
            max_samples: 512,
            seed: 7,
            min_fit_cells: 8,
        }
    }

    fn cloud(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                [
                    (t * 0.37).sin(),
                    (t * 0.11).cos(),
                    (t * 0.05).sin() * 0.5,
                    0.1 * (t * 0.7).cos(),
                    0.0,
                    0.2,
                ]
            })
            .collect()
    }

    #[test]
    fn average_path_length_matches_reference_values() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        let c256 = average_path_length(256);
        assert!((c256 - 10.2448).abs() < 1e-3, "c(256)={c256}");
    }

    #[test]
    fn outlier_scores_highest() {
        let mut samples = cloud(300);
        samples.push([8.0, -6.0, 4.0, 3.0, 5.0, 9.0]);
        let forest = IsolationForest::fit(&samples, &opts()).unwrap();
        let scores = forest.isolation_scores(&samples);
        let outlier = *scores.last().unwrap();
        assert_eq!(outlier, 1.0);
        let inlier_mean = scores[..300].iter().sum::<f64>() / 300.0;
        assert!(inlier_mean < 0.5, "inlier mean {inlier_mean}");
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn constant_population_scores_zero() {
        let samples = vec![[1.0; FOREST_DIMS]; 100];
        let forest = IsolationForest::fit(&samples, &opts()).unwrap();
        assert!(forest.isolation_scores(&samples).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn too_few_cells_is_a_fit_error() {
        let samples = cloud(5);
        let err = IsolationForest::fit(&samples, &opts()).unwrap_err();
        assert!(matches!(err, QcError::ModelFit(_)), "{err:?}");
    }

    #[test]
    fn non_finite_feature_is_a_fit_error() {
        let mut samples = cloud(50);
        samples[3][2] = f64::NAN;
        assert!(matches!(
            IsolationForest::fit(&samples, &opts()),
            Err(QcError::ModelFit(_))
        ));
    }

    #[test]
    fn same_seed_same_scores() {
        let mut samples = cloud(400);
        samples.push([4.0; FOREST_DIMS]);
        let subsampled = ForestOptions {
            max_samples: 64,
            ..opts()
        };
        let a = IsolationForest::fit(&samples, &subsampled).unwrap();
        assert_eq!(a.sample_size(), 64);
        let b = IsolationForest::fit(&samples, &subsampled).unwrap();
        assert_eq!(a.isolation_scores(&samples), b.isolation_scores(&samples));
    }
}
