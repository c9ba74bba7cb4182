// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Gavel metric descriptions. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "gavel_submissions_total",
        "Operations submitted, by lane and outcome"
    );
    describe_counter!(
        "gavel_dedup_decisions_total",
        "Deduplicator admission decisions"
    );
    describe_counter!("gavel_jobs_total", "Durable job outcomes, by job type");
    describe_counter!(
        "gavel_dead_letters_total",
        "Jobs quarantined after exhausting their retries"
    );
    describe_gauge!("gavel_in_flight", "Operations currently in flight");
    describe_gauge!("gavel_result_cache_size", "Cached operation results");
    describe_gauge!("gavel_batch_pending", "Audit entries waiting for a flush");
    describe_histogram!(
        "gavel_dispatch_latency_seconds",
        "Dispatch latency in seconds, by lane"
    );
}

/// Record a finished submission.
pub fn record_submission(lane: &str, outcome: &str) {
    metrics::counter!(
        "gavel_submissions_total",
        "lane" => lane.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an admission decision (admitted, duplicate, await, conflict, capacity).
pub fn record_dedup(decision: &'static str) {
    metrics::counter!("gavel_dedup_decisions_total", "decision" => decision).increment(1);
}

/// Record a processed durable job (completed, retrying, exhausted).
pub fn record_job(job_type: &str, outcome: &'static str) {
    metrics::counter!(
        "gavel_jobs_total",
        "job_type" => job_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_dead_letter(job_type: &str) {
    metrics::counter!("gavel_dead_letters_total", "job_type" => job_type.to_string()).increment(1);
}

pub fn set_in_flight(count: usize) {
    metrics::gauge!("gavel_in_flight").set(count as f64);
}

pub fn set_cache_size(count: usize) {
    metrics::gauge!("gavel_result_cache_size").set(count as f64);
}

pub fn set_batch_pending(count: usize) {
    metrics::gauge!("gavel_batch_pending").set(count as f64);
}

pub fn record_dispatch_latency(lane: &str, seconds: f64) {
    metrics::histogram!("gavel_dispatch_latency_seconds", "lane" => lane.to_string())
        .record(seconds);
}
