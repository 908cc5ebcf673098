//! One-shot prediction CLI
//!
//! Classifies a JSON report (or a JSON array of reports) with saved artifacts.

use anyhow::{bail, Context, Result};
use clap::Parser;
use patient_report_pipeline::InferenceEngine;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "predict", about = "Classify patient reports with a trained model")]
struct Args {
    /// Directory holding the trained artifacts
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// JSON file with one report object or an array of them
    #[arg(long, conflicts_with = "data")]
    input: Option<PathBuf>,

    /// Inline JSON report
    #[arg(long)]
    data: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("patient_report_pipeline=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let raw = match (&args.input, &args.data) {
        (Some(path), _) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        (None, Some(data)) => data.clone(),
        (None, None) => bail!("Provide --input <file> or --data <json>"),
    };
    let value: Value = serde_json::from_str(&raw).context("Input is not valid JSON")?;

    let engine = InferenceEngine::load(&args.model_dir)
        .with_context(|| format!("Failed to load model from {}", args.model_dir.display()))?;

    // Accept the HTTP batch shape as well as a bare array
    let batch = match &value {
        Value::Array(reports) => Some(reports),
        Value::Object(map) => map.get("reports").and_then(Value::as_array),
        _ => None,
    };
    let output = match batch {
        Some(reports) => serde_json::to_string_pretty(&engine.predict_json_batch(reports))?,
        None => serde_json::to_string_pretty(&engine.predict_json(&value))?,
    };
    println!("{}", output);

    Ok(())
}
