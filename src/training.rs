//! Training entry point: dataset in, persisted artifacts and metrics out

use crate::data::load_csv;
use crate::error::Result;
use crate::models::loader::{ArtifactStore, ModelMetadata};
use crate::models::selector::{ModelArtifact, ModelSelector, SelectionOptions};
use crate::preprocessing::PreprocessingContext;
use crate::types::table::Table;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Outcome of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub context: PreprocessingContext,
    pub artifact: ModelArtifact,
    pub metadata: Option<ModelMetadata>,
}

/// Fits preprocessing and selects the model in one pass
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
    options: SelectionOptions,
    target_column: Option<String>,
}

impl TrainingPipeline {
    pub fn new(options: SelectionOptions) -> Self {
        Self {
            options,
            target_column: None,
        }
    }

    /// Use `column` as the target instead of the last column
    pub fn with_target(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Fit everything in memory without touching the file system
    pub fn fit(&self, table: Table) -> Result<TrainingReport> {
        let start = Instant::now();
        info!(
            rows = table.n_rows(),
            columns = table.n_cols(),
            use_cv = self.options.use_cv,
            tune = self.options.tune_hyperparams,
            "Starting training"
        );

        let (context, data) = PreprocessingContext::fit_transform(table, self.target_column.as_deref())?;
        let labels = context.class_labels()?;
        let artifact = ModelSelector::new(self.options.clone()).select(&data.x, &data.y, &labels)?;

        info!(
            accuracy = format!("{:.4}", artifact.test_metrics.accuracy),
            f1_weighted = format!("{:.4}", artifact.test_metrics.f1_weighted),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training complete"
        );

        Ok(TrainingReport {
            context,
            artifact,
            metadata: None,
        })
    }

    /// Fit on a table and persist the artifacts under `output_dir`
    pub fn run<P: AsRef<Path>>(&self, table: Table, output_dir: P) -> Result<TrainingReport> {
        let mut report = self.fit(table)?;
        let metadata = ArtifactStore::new(output_dir).save(&report.context, &report.artifact)?;
        report.metadata = Some(metadata);
        Ok(report)
    }

    /// Load a CSV dataset, fit and persist
    pub fn run_csv<P: AsRef<Path>, Q: AsRef<Path>>(&self, dataset: P, output_dir: Q) -> Result<TrainingReport> {
        self.run(load_csv(dataset)?, output_dir)
    }
}
