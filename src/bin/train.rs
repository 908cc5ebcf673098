//! Training CLI
//!
//! Fits preprocessing and the classifier on a CSV dataset and writes the
//! artifacts used by the serving binary.

use anyhow::{Context, Result};
use clap::Parser;
use patient_report_pipeline::{config::AppConfig, TrainingPipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "train", about = "Train the patient report classifier")]
struct Args {
    /// CSV dataset with a header row
    #[arg(long)]
    dataset: PathBuf,

    /// Target column (defaults to the last column)
    #[arg(long)]
    target: Option<String>,

    /// Output directory for artifacts
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run stratified cross-validation
    #[arg(long)]
    cv: bool,

    /// Run the hyperparameter grid search
    #[arg(long)]
    tune: bool,

    /// Number of cross-validation folds
    #[arg(long)]
    cv_folds: Option<usize>,

    /// Configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();
    let config = AppConfig::load_from_path(&args.config)?;
    config.logging.init()?;

    let mut training = config.training.clone();
    training.use_cv |= args.cv;
    training.tune_hyperparams |= args.tune;
    if let Some(folds) = args.cv_folds {
        training.cv_folds = folds;
    }
    let target = args.target.or(training.target_column.clone());
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&config.artifacts.models_dir));

    info!(
        dataset = %args.dataset.display(),
        target = ?target,
        output = %output.display(),
        use_cv = training.use_cv,
        tune = training.tune_hyperparams,
        cv_folds = training.cv_folds,
        "Training configuration"
    );

    let mut pipeline = TrainingPipeline::new((&training).into());
    if let Some(target) = target {
        pipeline = pipeline.with_target(target);
    }
    let report = pipeline
        .run_csv(&args.dataset, &output)
        .with_context(|| format!("Training on {} failed", args.dataset.display()))?;

    let metrics = &report.artifact.test_metrics;
    println!("Accuracy:            {:.4}", metrics.accuracy);
    println!("Precision (weighted): {:.4}", metrics.precision_weighted);
    println!("Recall (weighted):   {:.4}", metrics.recall_weighted);
    println!("F1 (weighted):       {:.4}", metrics.f1_weighted);
    println!("F1 (macro):          {:.4}", metrics.f1_macro);
    if let Some(cv) = &report.artifact.cv_scores {
        println!("CV F1:               {:.4} (+/- {:.4})", cv.mean, cv.std * 2.0);
    }
    println!("Artifacts written to {}", output.display());

    Ok(())
}
