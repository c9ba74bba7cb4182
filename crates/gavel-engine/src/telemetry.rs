// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric hooks. Forward to `gavel-prometheus` when the `prometheus` feature
//! is enabled and compile to nothing otherwise.

#[cfg(feature = "prometheus")]
mod enabled {
    use gavel_core::Lane;

    pub(crate) fn submission(lane: Lane, outcome: &str) {
        gavel_prometheus::record_submission(&lane.to_string(), outcome);
    }

    pub(crate) fn dedup(decision: &'static str) {
        gavel_prometheus::record_dedup(decision);
    }

    pub(crate) fn job(job_type: &str, outcome: &'static str) {
        gavel_prometheus::record_job(job_type, outcome);
    }

    pub(crate) fn dead_letter(job_type: &str) {
        gavel_prometheus::record_dead_letter(job_type);
    }

    pub(crate) fn dedup_gauges(in_flight: usize, cache_size: usize) {
        gavel_prometheus::set_in_flight(in_flight);
        gavel_prometheus::set_cache_size(cache_size);
    }

    pub(crate) fn batch_pending(pending: usize) {
        gavel_prometheus::set_batch_pending(pending);
    }

    pub(crate) fn dispatch_latency(lane: Lane, elapsed: std::time::Duration) {
        gavel_prometheus::record_dispatch_latency(&lane.to_string(), elapsed.as_secs_f64());
    }
}

#[cfg(not(feature = "prometheus"))]
mod enabled {
    use gavel_core::Lane;

    pub(crate) fn submission(_lane: Lane, _outcome: &str) {}
    pub(crate) fn dedup(_decision: &'static str) {}
    pub(crate) fn job(_job_type: &str, _outcome: &'static str) {}
    pub(crate) fn dead_letter(_job_type: &str) {}
    pub(crate) fn dedup_gauges(_in_flight: usize, _cache_size: usize) {}
    pub(crate) fn batch_pending(_pending: usize) {}
    pub(crate) fn dispatch_latency(_lane: Lane, _elapsed: std::time::Duration) {}
}

pub(crate) use enabled::*;
