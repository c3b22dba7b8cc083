/// Uptime telemetry for the technical performance section.
///
/// Uptime is informational: every failure (missing credentials, HTTP error,
/// malformed payload, no monitors, timeout) degrades to [`FALLBACK_UPTIME`]
/// instead of failing the report.
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::rates::round_to;

pub const FALLBACK_UPTIME: f64 = 99.9;

/// Source of a single uptime percentage
pub trait UptimeProvider: Send + Sync {
    fn fetch_uptime(&self) -> impl Future<Output = Result<f64>> + Send;
}

/// Fixed value, for offline runs and tests
pub struct FixedUptime(pub f64);

impl UptimeProvider for FixedUptime {
    async fn fetch_uptime(&self) -> Result<f64> {
        Ok(self.0)
    }
}

/// UptimeRobot v2 `getMonitors` client
pub struct HttpUptimeProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpUptimeProvider {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build uptime HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

impl UptimeProvider for HttpUptimeProvider {
    async fn fetch_uptime(&self) -> Result<f64> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No uptime API key configured"))?;

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[
                ("api_key", api_key),
                ("format", "json"),
                ("custom_uptime_ratios", "30"),
            ])
            .send()
            .await
            .context("Uptime request failed")?;

        if !response.status().is_success() {
            bail!("Uptime service answered {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("Failed to read uptime response")?;
        parse_monitors(&body)
    }
}

#[derive(Debug, Deserialize)]
struct MonitorsResponse {
    stat: String,
    #[serde(default)]
    monitors: Vec<Monitor>,
}

#[derive(Debug, Deserialize)]
struct Monitor {
    custom_uptime_ratio: Option<String>,
}

/// Average the 30-day ratio across all monitors, clamped to [0, 100]
fn parse_monitors(body: &str) -> Result<f64> {
    let payload: MonitorsResponse =
        serde_json::from_str(body).context("Malformed uptime payload")?;

    if payload.stat != "ok" {
        bail!("Uptime service reported stat '{}'", payload.stat);
    }
    if payload.monitors.is_empty() {
        bail!("Uptime service reported no monitors");
    }

    let mut sum = 0.0;
    for monitor in &payload.monitors {
        let ratio = monitor
            .custom_uptime_ratio
            .as_deref()
            .ok_or_else(|| anyhow!("Monitor without uptime ratio"))?;
        let value: f64 = ratio
            .trim()
            .parse()
            .with_context(|| format!("Invalid uptime ratio '{}'", ratio))?;
        if !value.is_finite() {
            bail!("Invalid uptime ratio '{}'", ratio);
        }
        sum += value;
    }

    Ok((sum / payload.monitors.len() as f64).clamp(0.0, 100.0))
}

/// Fetch uptime within `timeout`, substituting the fallback on any failure.
pub async fn resolve_uptime<P: UptimeProvider>(provider: &P, timeout: Duration) -> f64 {
    match tokio::time::timeout(timeout, provider.fetch_uptime()).await {
        Ok(Ok(uptime)) if uptime.is_finite() => round_to(uptime.clamp(0.0, 100.0), 3),
        Ok(Ok(uptime)) => {
            tracing::warn!(uptime, "Uptime provider returned a non-finite value, using fallback");
            FALLBACK_UPTIME
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %format!("{:#}", e), "Uptime unavailable, using fallback");
            FALLBACK_UPTIME
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Uptime request timed out, using fallback");
            FALLBACK_UPTIME
        }
    }
}
