//! Serving statistics for the inference service

use crate::types::prediction::PredictionResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LATENCY_SAMPLES: usize = 10_000;

/// Counters and distributions of served predictions
pub struct InferenceMetrics {
    pub predictions_succeeded: AtomicU64,
    pub predictions_failed: AtomicU64,
    pub requests: AtomicU64,
    /// Latency per request, in microseconds
    latencies: RwLock<Vec<u64>>,
    by_class: RwLock<BTreeMap<String, u64>>,
    confidence_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl InferenceMetrics {
    pub fn new() -> Self {
        Self {
            predictions_succeeded: AtomicU64::new(0),
            predictions_failed: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            by_class: RwLock::new(BTreeMap::new()),
            confidence_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one request and the results it produced
    pub fn record_request(&self, latency: Duration, results: &[PredictionResult]) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(latency.as_micros() as u64);
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.drain(0..MAX_LATENCY_SAMPLES / 2);
            }
        }

        for result in results {
            self.record_result(result);
        }
    }

    fn record_result(&self, result: &PredictionResult) {
        let Some(prediction) = result.prediction() else {
            self.predictions_failed.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.predictions_succeeded.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_class) = self.by_class.write() {
            *by_class.entry(prediction.prediction.clone()).or_insert(0) += 1;
        }
        let bucket = (prediction.confidence * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.confidence_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn latency_stats(&self) -> LatencyStats {
        let Ok(latencies) = self.latencies.read() else {
            return LatencyStats::default();
        };
        if latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Requests per second since start
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            predictions_succeeded: self.predictions_succeeded.load(Ordering::Relaxed),
            predictions_failed: self.predictions_failed.load(Ordering::Relaxed),
            throughput_rps: self.throughput(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            latency: self.latency_stats(),
            predictions_by_class: self.by_class.read().map(|m| m.clone()).unwrap_or_default(),
            confidence_distribution: self.confidence_buckets.read().map(|b| *b).unwrap_or_default(),
        }
    }

    pub fn print_summary(&self) {
        let s = self.snapshot();
        let total = s.predictions_succeeded + s.predictions_failed;
        let failure_rate = if total > 0 {
            s.predictions_failed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          PATIENT REPORT CLASSIFIER - SERVING SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Requests: {:>8}  │  Throughput: {:>8.2} req/s           ║", s.requests, s.throughput_rps);
        info!("║ Predictions: {:>8}  │  Failed: {:>6} ({:>5.1}%)          ║", total, s.predictions_failed, failure_rate);
        info!(
            "║ Latency (μs): mean={:>6} p50={:>6} p95={:>6} p99={:>6}     ║",
            s.latency.mean_us, s.latency.p50_us, s.latency.p95_us, s.latency.p99_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Predictions by Class:                                        ║");
        for (class, count) in &s.predictions_by_class {
            let pct = if s.predictions_succeeded > 0 {
                *count as f64 / s.predictions_succeeded as f64 * 100.0
            } else {
                0.0
            };
            info!("║   {:16}: {:>6} ({:>5.1}%)", class, count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Confidence Distribution:                                     ║");
        let buckets_total: u64 = s.confidence_distribution.iter().sum();
        for (i, &count) in s.confidence_distribution.iter().enumerate() {
            let pct = if buckets_total > 0 {
                count as f64 / buckets_total as f64 * 100.0
            } else {
                0.0
            };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for InferenceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Point-in-time view served on the metrics route
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub predictions_succeeded: u64,
    pub predictions_failed: u64,
    pub throughput_rps: f64,
    pub uptime_secs: u64,
    pub latency: LatencyStats,
    pub predictions_by_class: BTreeMap<String, u64>,
    pub confidence_distribution: [u64; 10],
}

/// Periodic summary printer
pub struct MetricsReporter {
    metrics: Arc<InferenceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<InferenceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Print a summary every interval, forever
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn success(label: &str, p: f64) -> PredictionResult {
        let labels = vec![label.to_string(), "other".to_string()];
        PredictionResult::from_probabilities(&labels, &[p, 1.0 - p])
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = InferenceMetrics::new();
        metrics.record_request(Duration::from_micros(100), &[success("Healthy", 0.9)]);
        metrics.record_request(
            Duration::from_micros(300),
            &[success("Diabetic", 0.65), PredictionResult::from_error(&PipelineError::schema("bad"))],
        );

        let s = metrics.snapshot();
        assert_eq!(s.requests, 2);
        assert_eq!(s.predictions_succeeded, 2);
        assert_eq!(s.predictions_failed, 1);
        assert_eq!(s.predictions_by_class.get("Healthy"), Some(&1));
        assert_eq!(s.confidence_distribution[9], 1);
        assert_eq!(s.confidence_distribution[6], 1);
        assert_eq!(s.latency.count, 2);
        assert_eq!(s.latency.max_us, 300);
    }

    #[test]
    fn test_empty_latency_stats() {
        let stats = InferenceMetrics::new().latency_stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.p99_us, 0);
    }
}
