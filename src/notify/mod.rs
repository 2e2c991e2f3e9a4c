// src/notify/mod.rs
//! Best-effort delivery of the top alert of a cycle to registered devices.

pub mod push;

use async_trait::async_trait;
use std::sync::Arc;

use crate::model::AlertRecord;

pub use push::PushGatewayNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, top: &AlertRecord, device_ids: &[String]) -> anyhow::Result<()>;
}

/// Used when no push gateway is configured: the alert is only logged.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, top: &AlertRecord, device_ids: &[String]) -> anyhow::Result<()> {
        tracing::info!(
            target: "notify",
            event = %top.candidate.event,
            probability = top.probability(),
            devices = device_ids.len(),
            "top alert (no push gateway configured)"
        );
        Ok(())
    }
}

pub fn from_config(push_url: Option<&str>) -> Arc<dyn Notifier> {
    match push_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => Arc::new(PushGatewayNotifier::new(url.to_string())),
        None => Arc::new(LogNotifier),
    }
}

/// Fire-and-forget: failures are logged and never reach the cycle.
pub fn spawn_notify(notifier: Arc<dyn Notifier>, top: AlertRecord, device_ids: Vec<String>) {
    tokio::spawn(async move {
        match notifier.notify(&top, &device_ids).await {
            Ok(()) => tracing::debug!(
                target: "notify",
                notifier = notifier.name(),
                devices = device_ids.len(),
                "notification sent"
            ),
            Err(e) => tracing::warn!(
                target: "notify",
                notifier = notifier.name(),
                error = %e,
                "notification failed"
            ),
        }
    });
}
