//! Model selection: stratified cross-validation, grid search and final fit

use crate::error::{PipelineError, Result};
use crate::models::evaluation::{f1_weighted, ClassificationMetrics};
use crate::models::forest::{Classifier, ForestParams, MaxFeatures, RandomForest};
use crate::models::validation::{train_test_split, validate_classes, StratifiedKFold};
use crate::types::table::FeatureMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Hyperparameter lattice searched by the grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100, 200],
            max_depth: vec![Some(15), Some(20), Some(25), None],
            min_samples_split: vec![2, 5],
            min_samples_leaf: vec![1, 2],
            max_features: vec![MaxFeatures::Sqrt, MaxFeatures::Log2],
        }
    }
}

impl ParamGrid {
    /// Every combination of the lattice, other settings taken from `base`
    pub fn candidates(&self, base: &ForestParams) -> Vec<ForestParams> {
        let mut out = Vec::with_capacity(self.len());
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        for &max_features in &self.max_features {
                            out.push(ForestParams {
                                n_estimators,
                                max_depth,
                                min_samples_split,
                                min_samples_leaf,
                                max_features,
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.n_estimators.len()
            * self.max_depth.len()
            * self.min_samples_split.len()
            * self.min_samples_leaf.len()
            * self.max_features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Switches and settings of one selection run
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOptions {
    pub use_cv: bool,
    pub tune_hyperparams: bool,
    pub cv_folds: usize,
    pub test_size: f64,
    pub random_state: u64,
    pub grid: ParamGrid,
    /// Untuned forest scored by the informational cross-validation
    pub baseline_params: ForestParams,
    /// Configuration fit when tuning is off, and the base of the grid
    pub default_params: ForestParams,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            use_cv: true,
            tune_hyperparams: false,
            cv_folds: 5,
            test_size: 0.2,
            random_state: 42,
            grid: ParamGrid::default(),
            baseline_params: ForestParams::default(),
            default_params: ForestParams {
                n_estimators: 200,
                max_depth: Some(20),
                ..ForestParams::default()
            },
        }
    }
}

/// Mean and spread of per-fold weighted F1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    pub mean: f64,
    pub std: f64,
    pub scores: Vec<f64>,
}

impl CvSummary {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
            scores,
        }
    }
}

/// Fitted classifier with everything learnt while selecting it
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub model: RandomForest,
    pub params: ForestParams,
    pub cv_scores: Option<CvSummary>,
    pub test_metrics: ClassificationMetrics,
    /// Feature importance, highest first
    pub feature_importance: Vec<(String, f64)>,
}

/// Chooses and fits the final classifier
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    options: SelectionOptions,
}

impl ModelSelector {
    pub fn new(options: SelectionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    /// Run cross-validation, grid search, final fit and evaluation.
    ///
    /// `labels` names the class codes used in `y`.
    pub fn select(&self, x: &FeatureMatrix, y: &[usize], labels: &[String]) -> Result<ModelArtifact> {
        let opts = &self.options;
        let n_classes = labels.len();
        if x.n_rows() != y.len() {
            return Err(PipelineError::config(format!("{} rows but {} labels", x.n_rows(), y.len())));
        }

        let folding = opts.use_cv || opts.tune_hyperparams;
        validate_classes(y, n_classes, if folding { opts.cv_folds.max(2) } else { 2 })?;
        let base = ForestParams {
            random_state: opts.random_state,
            ..opts.default_params.clone()
        };

        let cv_scores = if opts.use_cv {
            let start = Instant::now();
            let baseline = ForestParams {
                random_state: opts.random_state,
                ..opts.baseline_params.clone()
            };
            let scores = self.cross_validate(&baseline, x, y, n_classes)?;
            let summary = CvSummary::from_scores(scores);
            info!(
                folds = opts.cv_folds,
                mean_f1 = format!("{:.4}", summary.mean),
                std_f1 = format!("{:.4}", summary.std),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Cross-validation complete"
            );
            Some(summary)
        } else {
            None
        };

        let params = if opts.tune_hyperparams {
            self.grid_search(&base, x, y, n_classes)?
        } else {
            base
        };

        let (train_idx, test_idx) = train_test_split(y, opts.test_size, opts.random_state)?;
        let x_train = x.select(&train_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| y[i]).collect();
        let x_test = x.select(&test_idx);
        let y_test: Vec<usize> = test_idx.iter().map(|&i| y[i]).collect();

        let start = Instant::now();
        let mut model = RandomForest::new(params.clone());
        model.fit(&x_train, &y_train, n_classes)?;
        info!(
            train_rows = x_train.n_rows(),
            test_rows = x_test.n_rows(),
            params = %params,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Final model fitted"
        );

        let y_pred = model.predict(&x_test)?;
        let test_metrics = ClassificationMetrics::compute(&y_test, &y_pred, labels)?;
        test_metrics.log_summary();

        let feature_importance = rank_importance(x.feature_names(), model.feature_importances());
        for (rank, (name, score)) in feature_importance.iter().take(10).enumerate() {
            info!(rank = rank + 1, feature = %name, importance = format!("{:.4}", score), "Feature importance");
        }

        Ok(ModelArtifact {
            model,
            params,
            cv_scores,
            test_metrics,
            feature_importance,
        })
    }

    /// Weighted F1 of `params` on each stratified fold
    pub fn cross_validate(
        &self,
        params: &ForestParams,
        x: &FeatureMatrix,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Vec<f64>> {
        let folds = StratifiedKFold::new(self.options.cv_folds, self.options.random_state)?.split(y)?;

        folds
            .par_iter()
            .map(|(train, test)| {
                let y_train: Vec<usize> = train.iter().map(|&i| y[i]).collect();
                let y_test: Vec<usize> = test.iter().map(|&i| y[i]).collect();

                let mut model = RandomForest::new(params.clone());
                model.fit(&x.select(train), &y_train, n_classes)?;
                let y_pred = model.predict(&x.select(test))?;
                Ok(f1_weighted(&y_test, &y_pred, n_classes))
            })
            .collect()
    }

    /// Best lattice point by mean fold F1; the first candidate wins ties
    fn grid_search(&self, base: &ForestParams, x: &FeatureMatrix, y: &[usize], n_classes: usize) -> Result<ForestParams> {
        let candidates = self.options.grid.candidates(base);
        if candidates.is_empty() {
            return Err(PipelineError::config("hyperparameter grid is empty"));
        }
        info!(candidates = candidates.len(), folds = self.options.cv_folds, "Starting grid search");
        let start = Instant::now();

        let scores: Vec<f64> = candidates
            .par_iter()
            .map(|params| {
                let mean = CvSummary::from_scores(self.cross_validate(params, x, y, n_classes)?).mean;
                debug!(params = %params, mean_f1 = mean, "Grid candidate scored");
                Ok(mean)
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut best = 0;
        for (i, &score) in scores.iter().enumerate() {
            if score > scores[best] {
                best = i;
            }
        }

        info!(
            best_f1 = format!("{:.4}", scores[best]),
            params = %candidates[best],
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Grid search complete"
        );
        Ok(candidates[best].clone())
    }
}

/// Pair importances with feature names, highest first
pub fn rank_importance(names: &[String], importances: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names.iter().cloned().zip(importances.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
