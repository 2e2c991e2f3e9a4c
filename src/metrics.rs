// src/metrics.rs
use anyhow::Context;
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish the static pipeline settings.
    /// Must be called once per process, before any metric is emitted.
    pub fn init(accept_threshold: u8, capacity: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        gauge!("alerts_accept_threshold").set(accept_threshold as f64);
        gauge!("alerts_capacity").set(capacity as f64);

        Ok(Self { handle })
    }
}
