//! Random-forest classifier (CART trees, Gini impurity, bootstrap aggregation)

use crate::error::{PipelineError, Result};
use crate::types::table::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum impurity decrease for a split to be kept
const MIN_IMPURITY_DECREASE: f64 = 1e-12;

/// Probabilistic multi-class classifier over a named feature matrix
pub trait Classifier: Send + Sync {
    /// Fit on rows of `x` labelled with codes `0..n_classes`
    fn fit(&mut self, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<()>;

    /// Per-row class probabilities, each row summing to 1
    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>>;

    /// Most probable class per row (lowest code wins ties)
    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<usize>> {
        Ok(self.predict_proba(x)?.iter().map(|p| argmax(p)).collect())
    }

    /// Non-negative importance per feature, in schema order
    fn feature_importances(&self) -> &[f64];

    fn n_classes(&self) -> usize;

    fn model_type(&self) -> &'static str;
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

/// Sample weighting by class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// `n_samples / (n_classes * class_count)`, compensating imbalance
    Balanced,
    Uniform,
}

/// Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees in the ensemble
    pub n_estimators: usize,

    /// Maximum tree depth, unlimited when `None`
    pub max_depth: Option<usize>,

    /// Minimum samples a node needs before it may split
    pub min_samples_split: usize,

    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,

    /// Features considered per split
    pub max_features: MaxFeatures,

    /// Per-class sample weighting
    pub class_weight: ClassWeight,

    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,

    /// Seed; tree `t` uses `random_state + t`
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            random_state: 42,
        }
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self.max_depth.map_or("none".to_string(), |d| d.to_string());
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_split={} min_samples_leaf={} max_features={}",
            self.n_estimators, depth, self.min_samples_split, self.min_samples_leaf, self.max_features
        )
    }
}

/// A tree node; nodes reference children by index into the tree's node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

/// A fitted CART tree. Traversal goes left when `x[feature] <= threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn distribution(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
                Node::Leaf { distribution } => return distribution,
            }
        }
    }

    /// Check the node graph of a deserialized tree.
    ///
    /// Children always sit after their parent, so the walk from the root
    /// terminates and stays in bounds.
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(PipelineError::config("tree has no nodes"));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(PipelineError::config(format!(
                            "node {} splits on feature {} of {}",
                            idx, feature, n_features
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(PipelineError::config(format!("node {} has a non-finite threshold", idx)));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(PipelineError::config(format!(
                                "node {} points at child {} of {} nodes",
                                idx,
                                child,
                                self.nodes.len()
                            )));
                        }
                    }
                }
                Node::Leaf { distribution } => {
                    if distribution.len() != n_classes {
                        return Err(PipelineError::config(format!(
                            "leaf {} holds {} class weights, expected {}",
                            idx,
                            distribution.len(),
                            n_classes
                        )));
                    }
                    let sum: f64 = distribution.iter().sum();
                    if distribution.iter().any(|p| !p.is_finite() || *p < 0.0) || (sum - 1.0).abs() > 1e-6 {
                        return Err(PipelineError::config(format!("leaf {} is not a probability distribution", idx)));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                Node::Leaf { .. } => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    y: &'a [usize],
    sample_weight: &'a [f64],
    n_classes: usize,
    n_features: usize,
    max_features: usize,
    params: &'a ForestParams,
    rng: StdRng,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    children_impurity: f64,
    position: usize,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

impl<'a> TreeBuilder<'a> {
    fn class_weights(&self, samples: &[usize]) -> (Vec<f64>, f64) {
        let mut counts = vec![0.0; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += self.sample_weight[s];
        }
        let total = counts.iter().sum();
        (counts, total)
    }

    fn build(&mut self, mut samples: Vec<usize>, depth: usize) -> usize {
        let (counts, total) = self.class_weights(&samples);
        let impurity = gini(&counts, total);

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        let too_small = samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf;

        if depth_reached || too_small || impurity <= 0.0 {
            return self.leaf(counts, total);
        }

        let Some(split) = self.best_split(&mut samples, total) else {
            return self.leaf(counts, total);
        };

        let decrease = impurity * total - split.children_impurity;
        if decrease <= MIN_IMPURITY_DECREASE {
            return self.leaf(counts, total);
        }
        self.importances[split.feature] += decrease;

        // best_split leaves `samples` sorted by the winning feature
        let right_samples = samples.split_off(split.position);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { distribution: Vec::new() });
        let left = self.build(samples, depth + 1);
        let right = self.build(right_samples, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn leaf(&mut self, counts: Vec<f64>, total: f64) -> usize {
        let distribution = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    /// Search a random feature subset for the split with the lowest weighted
    /// child impurity. On success `samples` is sorted by the chosen feature.
    fn best_split(&mut self, samples: &mut [usize], total: f64) -> Option<SplitCandidate> {
        let candidates = rand::seq::index::sample(&mut self.rng, self.n_features, self.max_features).into_vec();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<SplitCandidate> = None;

        for feature in candidates {
            samples.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let (right_init, _) = self.class_weights(samples);
            let mut right = right_init;
            let mut left = vec![0.0; self.n_classes];
            let mut left_total = 0.0;

            for i in 0..samples.len().saturating_sub(1) {
                let s = samples[i];
                let w = self.sample_weight[s];
                left[self.y[s]] += w;
                right[self.y[s]] -= w;
                left_total += w;

                let n_left = i + 1;
                if n_left < min_leaf || samples.len() - n_left < min_leaf {
                    continue;
                }
                let here = self.rows[s][feature];
                let next = self.rows[samples[i + 1]][feature];
                if here >= next {
                    continue;
                }

                let right_total = total - left_total;
                let children = gini(&left, left_total) * left_total + gini(&right, right_total) * right_total;
                if best.as_ref().map_or(true, |b| children < b.children_impurity) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        children_impurity: children,
                        position: n_left,
                    });
                }
            }
        }

        if let Some(b) = &best {
            let feature = b.feature;
            samples.sort_by(|&a, &c| self.rows[a][feature].total_cmp(&self.rows[c][feature]));
        }
        best
    }
}

/// Bagged ensemble of CART trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    feature_names: Vec<String>,
    n_classes: usize,
    trees: Vec<DecisionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            feature_names: Vec::new(),
            n_classes: 0,
            trees: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Check a deserialized forest for internal consistency
    pub fn validate(&self) -> Result<()> {
        if !self.is_fitted() {
            return Err(PipelineError::config("model has no trees"));
        }
        if self.n_classes == 0 || self.feature_names.is_empty() {
            return Err(PipelineError::config("model has no classes or no features"));
        }
        if self.feature_importances.len() != self.feature_names.len() {
            return Err(PipelineError::config(format!(
                "model has {} importances for {} features",
                self.feature_importances.len(),
                self.feature_names.len()
            )));
        }
        for tree in &self.trees {
            tree.validate(self.feature_names.len(), self.n_classes)?;
        }
        Ok(())
    }

    fn sample_weights(&self, y: &[usize], n_classes: usize) -> Vec<f64> {
        match self.params.class_weight {
            ClassWeight::Uniform => vec![1.0; y.len()],
            ClassWeight::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &c in y {
                    counts[c] += 1;
                }
                let per_class: Vec<f64> = counts
                    .iter()
                    .map(|&c| if c > 0 { y.len() as f64 / (n_classes as f64 * c as f64) } else { 0.0 })
                    .collect();
                y.iter().map(|&c| per_class[c]).collect()
            }
        }
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<()> {
        if x.n_rows() == 0 || x.n_features() == 0 {
            return Err(PipelineError::config("cannot fit a forest on an empty matrix"));
        }
        if x.n_rows() != y.len() {
            return Err(PipelineError::config(format!(
                "{} rows but {} labels",
                x.n_rows(),
                y.len()
            )));
        }
        if n_classes == 0 || y.iter().any(|&c| c >= n_classes) {
            return Err(PipelineError::config(format!("labels must be codes below {}", n_classes)));
        }
        if self.params.n_estimators == 0 {
            return Err(PipelineError::config("n_estimators must be at least 1"));
        }

        let sample_weight = self.sample_weights(y, n_classes);
        let n_features = x.n_features();
        let max_features = self.params.max_features.resolve(n_features);
        let params = &self.params;
        let rows = x.rows();

        let fitted: Vec<(DecisionTree, Vec<f64>)> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(params.random_state.wrapping_add(t as u64));
                let samples: Vec<usize> = if params.bootstrap {
                    (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect()
                } else {
                    (0..rows.len()).collect()
                };

                let mut builder = TreeBuilder {
                    rows,
                    y,
                    sample_weight: &sample_weight,
                    n_classes,
                    n_features,
                    max_features,
                    params,
                    rng,
                    nodes: Vec::new(),
                    importances: vec![0.0; n_features],
                };
                builder.build(samples, 0);
                (DecisionTree { nodes: builder.nodes }, builder.importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for (_, tree_importance) in &fitted {
            let sum: f64 = tree_importance.iter().sum();
            if sum > 0.0 {
                for (acc, v) in importances.iter_mut().zip(tree_importance) {
                    *acc += v / sum;
                }
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.feature_names = x.feature_names().to_vec();
        self.n_classes = n_classes;
        self.trees = fitted.into_iter().map(|(tree, _)| tree).collect();
        self.feature_importances = importances;
        Ok(())
    }

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<Vec<f64>>> {
        if !self.is_fitted() {
            return Err(PipelineError::config("model has not been fitted"));
        }
        x.ensure_schema(&self.feature_names)?;

        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .iter()
            .map(|row| {
                let mut proba = vec![0.0; self.n_classes];
                for tree in &self.trees {
                    for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                        *p += d;
                    }
                }
                proba.iter_mut().for_each(|p| *p /= n_trees);
                proba
            })
            .collect())
    }

    fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn model_type(&self) -> &'static str {
        "RandomForestClassifier"
    }
}
