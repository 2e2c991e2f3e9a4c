// src/notify/push.rs
use super::Notifier;
use crate::model::{AlertRecord, ImpactDirection};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Posts one JSON message per cycle to a push gateway, which fans it out to devices.
#[derive(Clone)]
pub struct PushGatewayNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl PushGatewayNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[derive(Serialize, Debug, PartialEq)]
pub struct PushMessage<'a> {
    pub title: String,
    pub body: String,
    pub link: &'a str,
    pub probability: u8,
    pub tokens: &'a [String],
}

impl<'a> PushMessage<'a> {
    pub fn build(top: &'a AlertRecord, tokens: &'a [String]) -> Self {
        let arrow = match top.candidate.impact_direction {
            ImpactDirection::Up => "▲",
            ImpactDirection::Down => "▼",
            ImpactDirection::Neutral => "•",
        };
        let title = match top.candidate.company.as_deref() {
            Some(company) => format!("{arrow} {company} ({}%)", top.probability()),
            None => format!("{arrow} Market impact ({}%)", top.probability()),
        };
        Self {
            title,
            body: top.candidate.event.clone(),
            link: top.link(),
            probability: top.probability(),
            tokens,
        }
    }
}

#[async_trait]
impl Notifier for PushGatewayNotifier {
    fn name(&self) -> &str {
        "push-gateway"
    }

    async fn notify(&self, top: &AlertRecord, device_ids: &[String]) -> Result<()> {
        if device_ids.is_empty() {
            return Ok(());
        }
        let payload = PushMessage::build(top, device_ids);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("push gateway HTTP error: {e}"),
                },
                Err(e) => anyhow!("push gateway request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}
