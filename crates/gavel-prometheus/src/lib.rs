// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Gavel engine.
//!
//! The engine records through the metrics-rs facade (see [`recording`]);
//! [`PrometheusAdapter`] installs the Prometheus recorder and renders the
//! text exposition format for whatever HTTP surface the host provides.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use gavel_core::{AdapterType, GavelError, HealthStatus, PluginAdapter};

pub use recording::{
    record_dead_letter, record_dedup, record_dispatch_latency, record_job, record_submission,
    register_metrics, set_batch_pending, set_cache_size, set_in_flight,
};

/// Installs the global Prometheus recorder and keeps its render handle.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the recorder globally. Fails if a recorder is already installed.
    pub fn new() -> Result<Self, GavelError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GavelError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, GavelError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), GavelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A local recorder avoids the process-wide install, which can only happen once.
    #[test]
    fn recorded_metrics_render_in_text_format() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_submission("realtime", "success");
            record_submission("realtime", "success");
            record_dedup("duplicate");
            record_job("BULK_BAN", "completed");
            record_dead_letter("BULK_KICK");
            set_in_flight(3);
        });

        let text = handle.render();
        let submissions = text
            .lines()
            .find(|l| l.starts_with("gavel_submissions_total{"))
            .expect("submission counter rendered");
        assert!(submissions.contains(r#"lane="realtime""#));
        assert!(submissions.contains(r#"outcome="success""#));
        assert!(submissions.ends_with(" 2"));
        assert!(text.contains(r#"gavel_dedup_decisions_total{decision="duplicate"} 1"#));
        assert!(text.contains(r#"gavel_dead_letters_total{job_type="BULK_KICK"} 1"#));
        assert!(text.contains("gavel_in_flight 3"));
    }
}
