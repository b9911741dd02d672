//! Prometheus metrics for the job runtime.
//!
//! Compiled only with the `metrics` feature.
//!
//! ## Counters
//! - `forage_jobs_created_total{job_type}`
//! - `forage_jobs_finished_total{job_type,status}`: completed, failed or cancelled
//! - `forage_jobs_retried_total{job_type}`
//!
//! ## Gauges
//! - `forage_queue_depth`: tickets waiting in the priority queue
//!
//! ## Histograms
//! - `forage_job_duration_seconds{job_type,status}`: wall time of one attempt
#![cfg(feature = "metrics")]

use prometheus::{exponential_buckets, CounterVec, Gauge, HistogramVec, Opts, Registry};
use std::sync::LazyLock;

/// Registry holding every forage metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static JOBS_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("forage_jobs_created_total", "Total number of jobs created");
    CounterVec::new(opts, &["job_type"]).expect("forage_jobs_created_total metric creation failed")
});

pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "forage_jobs_finished_total",
        "Total number of jobs that reached a final status",
    );
    CounterVec::new(opts, &["job_type", "status"])
        .expect("forage_jobs_finished_total metric creation failed")
});

pub static JOBS_RETRIED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "forage_jobs_retried_total",
        "Total number of failed attempts sent back to the queue",
    );
    CounterVec::new(opts, &["job_type"]).expect("forage_jobs_retried_total metric creation failed")
});

pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("forage_queue_depth", "Tickets waiting in the priority queue")
        .expect("forage_queue_depth metric creation failed")
});

pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.01, 2.0, 16).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "forage_job_duration_seconds",
        "Wall time of one job attempt in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["job_type", "status"])
        .expect("forage_job_duration_seconds metric creation failed")
});

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_CREATED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(JOBS_RETRIED_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub fn record_job_created(job_type: &str) {
    JOBS_CREATED_TOTAL.with_label_values(&[job_type]).inc();
}

pub fn record_job_finished(job_type: &str, status: &str) {
    JOBS_FINISHED_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}

pub fn record_job_retried(job_type: &str) {
    JOBS_RETRIED_TOTAL.with_label_values(&[job_type]).inc();
}

pub fn set_queue_depth(depth: f64) {
    QUEUE_DEPTH.set(depth);
}

pub fn observe_job_duration(job_type: &str, status: &str, duration_secs: f64) {
    JOB_DURATION_SECONDS
        .with_label_values(&[job_type, status])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_metrics().expect("first init");
        init_metrics().expect("second init");
    }

    #[test]
    fn gathered_text_contains_recorded_series() {
        init_metrics().expect("metrics initialization should succeed");

        record_job_created("food_search");
        record_job_finished("food_search", "completed");
        record_job_retried("health_check");
        set_queue_depth(3.0);
        observe_job_duration("food_search", "completed", 0.25);

        let output = gather_metrics().expect("gather should succeed");
        assert!(output.contains("forage_jobs_created_total"));
        assert!(output.contains("forage_jobs_finished_total"));
        assert!(output.contains("forage_jobs_retried_total"));
        assert!(output.contains("forage_queue_depth"));
        assert!(output.contains("forage_job_duration_seconds"));
    }
}
