//! Synthetic Patient Dataset Generator
//!
//! Writes a CSV of patient health reports with a three-class `diagnosis`
//! target, for exercising the training pipeline.
//!
//! Usage: `generate_dataset [rows] [output] [seed]`

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

/// One CSV row; `None` cells are written empty
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PatientReport {
    age: Option<u32>,
    gender: Option<&'static str>,
    #[serde(rename = "BMI")]
    bmi: Option<f64>,
    blood_pressure: Option<u32>,
    cholesterol: Option<u32>,
    glucose: Option<u32>,
    smoking: Option<&'static str>,
    #[serde(rename = "diagnosis")]
    diagnosis: &'static str,
}

/// Report generator with a fixed seed
struct PatientGenerator {
    rng: StdRng,
    missing_rate: f64,
}

impl PatientGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            missing_rate: 0.02,
        }
    }

    fn maybe<T>(&mut self, value: T) -> Option<T> {
        if self.rng.gen_bool(self.missing_rate) {
            None
        } else {
            Some(value)
        }
    }

    fn choice(&mut self, choices: &[&'static str]) -> &'static str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn generate_healthy(&mut self) -> PatientReport {
        let report = PatientReport {
            age: Some(self.rng.gen_range(20..60)),
            gender: Some(self.choice(&["Male", "Female"])),
            bmi: Some(round1(self.rng.gen_range(18.5..27.0))),
            blood_pressure: Some(self.rng.gen_range(100..135)),
            cholesterol: Some(self.rng.gen_range(150..210)),
            glucose: Some(self.rng.gen_range(70..105)),
            smoking: Some(self.choice(&["Never", "Never", "Former"])),
            diagnosis: "Healthy",
        };
        self.blank_some(report)
    }

    fn generate_hypertension(&mut self) -> PatientReport {
        let report = PatientReport {
            age: Some(self.rng.gen_range(45..85)),
            gender: Some(self.choice(&["Male", "Female"])),
            bmi: Some(round1(self.rng.gen_range(24.0..34.0))),
            blood_pressure: Some(self.rng.gen_range(140..190)),
            cholesterol: Some(self.rng.gen_range(190..290)),
            glucose: Some(self.rng.gen_range(80..120)),
            smoking: Some(self.choice(&["Current", "Former", "Never"])),
            diagnosis: "Hypertension",
        };
        self.blank_some(report)
    }

    fn generate_diabetes(&mut self) -> PatientReport {
        let report = PatientReport {
            age: Some(self.rng.gen_range(35..80)),
            gender: Some(self.choice(&["Male", "Female"])),
            bmi: Some(round1(self.rng.gen_range(27.0..42.0))),
            blood_pressure: Some(self.rng.gen_range(115..160)),
            cholesterol: Some(self.rng.gen_range(180..260)),
            glucose: Some(self.rng.gen_range(126..250)),
            smoking: Some(self.choice(&["Current", "Former", "Never"])),
            diagnosis: "Diabetes",
        };
        self.blank_some(report)
    }

    /// Knock out a few feature cells, never the target
    fn blank_some(&mut self, r: PatientReport) -> PatientReport {
        PatientReport {
            age: r.age.and_then(|v| self.maybe(v)),
            gender: r.gender.and_then(|v| self.maybe(v)),
            bmi: r.bmi.and_then(|v| self.maybe(v)),
            blood_pressure: r.blood_pressure.and_then(|v| self.maybe(v)),
            cholesterol: r.cholesterol.and_then(|v| self.maybe(v)),
            glucose: r.glucose.and_then(|v| self.maybe(v)),
            smoking: r.smoking.and_then(|v| self.maybe(v)),
            diagnosis: r.diagnosis,
        }
    }

    fn generate(&mut self) -> PatientReport {
        match self.rng.gen_range(0..100) {
            0..=49 => self.generate_healthy(),
            50..=74 => self.generate_hypertension(),
            _ => self.generate_diabetes(),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let rows: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let output = args.get(2).map(String::as_str).unwrap_or("data/patient_reports.csv");
    let seed: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(42);

    info!(rows, output = %output, seed, "Generating synthetic patient reports");

    if let Some(parent) = std::path::Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(output).with_context(|| format!("Failed to open {}", output))?;

    let mut generator = PatientGenerator::new(seed);
    let mut counts = std::collections::BTreeMap::new();
    for _ in 0..rows {
        let report = generator.generate();
        *counts.entry(report.diagnosis).or_insert(0usize) += 1;
        writer.serialize(&report)?;
    }
    writer.flush()?;

    info!(rows, classes = ?counts, output = %output, "Dataset written");
    Ok(())
}
