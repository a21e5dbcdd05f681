//! Firebase Realtime Database sink over the REST API
//!
//! Data layout (shared with existing dashboards reading the database):
//! - `barang_masuk` / `barang_keluar`: `{ total, history }` per mode
//! - `history` entries: `{ qr_data, waktu, mode }` with `mode` "masuk" or "keluar"
//! - `ringkasan`: `{ total_masuk, total_keluar, sisa_barang, last_update }`
//!
//! Every node is addressed as `{database_url}/{path}.json`, with the optional
//! auth token passed as the `auth` query parameter.

use crate::domain::types::{CountedEvent, TrackingMode};
use crate::io::report_channel::SummaryReport;
use crate::io::report_sink::ReportSink;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Root node holding the running totals
const SUMMARY_PATH: &str = "ringkasan";

/// Database node for a mode
pub fn mode_path(mode: TrackingMode) -> &'static str {
    match mode {
        TrackingMode::Inbound => "barang_masuk",
        TrackingMode::Outbound => "barang_keluar",
    }
}

/// Mode label stored in history entries
pub fn mode_label(mode: TrackingMode) -> &'static str {
    match mode {
        TrackingMode::Inbound => "masuk",
        TrackingMode::Outbound => "keluar",
    }
}

/// ISO 8601 local time for an epoch-ms timestamp
pub fn iso_timestamp(epoch_ms: u64) -> String {
    DateTime::from_timestamp_millis(epoch_ms as i64)
        .unwrap_or_default()
        .with_timezone(&Local)
        .to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Empty database structure written on first start and on reset
pub fn initial_structure(timestamp_ms: u64) -> Value {
    json!({
        "barang_masuk": { "total": 0, "history": {} },
        "barang_keluar": { "total": 0, "history": {} },
        "ringkasan": {
            "total_masuk": 0,
            "total_keluar": 0,
            "sisa_barang": 0,
            "last_update": iso_timestamp(timestamp_ms),
        },
    })
}

/// History entry for a counted event
pub fn history_entry(event: &CountedEvent) -> Value {
    json!({
        "qr_data": event.code.as_str(),
        "waktu": iso_timestamp(event.timestamp_ms),
        "mode": mode_label(event.mode),
    })
}

/// Summary node body
pub fn summary_body(summary: &SummaryReport) -> Value {
    json!({
        "total_masuk": summary.total_inbound,
        "total_keluar": summary.total_outbound,
        "sisa_barang": summary.remainder,
        "last_update": iso_timestamp(summary.timestamp_ms),
    })
}

/// Firebase Realtime Database REST client
pub struct FirebaseSink {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl FirebaseSink {
    pub fn new(
        database_url: &str,
        auth_token: Option<&str>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        if !database_url.starts_with("https://") && !database_url.starts_with("http://") {
            anyhow::bail!("invalid Firebase database URL: {database_url:?}");
        }

        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Firebase HTTP client")?;

        Ok(Self {
            client,
            base_url: database_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.map(str::to_string),
        })
    }

    /// REST endpoint for a database path
    fn node_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}/{}.json", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, self.node_url(path));
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<Value> {
        let response = self
            .request(Method::GET, path)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {path} rejected"))?;
        response.json::<Value>().await.with_context(|| format!("GET {path} returned invalid JSON"))
    }

    async fn put_json(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        self.request(Method::PUT, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PUT {path} failed"))?
            .error_for_status()
            .with_context(|| format!("PUT {path} rejected"))?;
        Ok(())
    }

    async fn post_json(&self, path: &str, body: &Value) -> anyhow::Result<()> {
        self.request(Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {path} rejected"))?;
        Ok(())
    }

    /// Append history and bump the per-mode total, returning the new total
    async fn push_event(&self, event: &CountedEvent) -> anyhow::Result<u64> {
        let node = mode_path(event.mode);
        self.post_json(&format!("{node}/history"), &history_entry(event)).await?;

        let total_path = format!("{node}/total");
        let current = self.get_json(&total_path, &[]).await?.as_u64().unwrap_or(0);
        let total = current + 1;
        self.put_json(&total_path, &json!(total)).await?;
        Ok(total)
    }

    async fn ensure_structure(&self) -> anyhow::Result<bool> {
        // Only the top-level keys are needed to tell an empty database
        let existing = self.get_json("", &[("shallow", "true")]).await?;
        if existing.is_null() {
            self.put_json("", &initial_structure(crate::domain::epoch_ms())).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl ReportSink for FirebaseSink {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn init(&self) -> bool {
        match self.ensure_structure().await {
            Ok(created) => {
                info!(url = %self.base_url, created = %created, "firebase_ready");
                true
            }
            Err(e) => {
                error!(url = %self.base_url, error = format!("{e:#}"), "firebase_init_failed");
                false
            }
        }
    }

    async fn report_event(&self, event: &CountedEvent) -> bool {
        let start = Instant::now();
        match self.push_event(event).await {
            Ok(total) => {
                info!(
                    code = %event.code,
                    mode = %event.mode,
                    remote_total = %total,
                    latency_ms = %start.elapsed().as_millis(),
                    "report_event_sent"
                );
                true
            }
            Err(e) => {
                error!(
                    code = %event.code,
                    mode = %event.mode,
                    error = format!("{e:#}"),
                    "report_event_failed"
                );
                false
            }
        }
    }

    async fn report_summary(&self, summary: &SummaryReport) -> bool {
        match self.put_json(SUMMARY_PATH, &summary_body(summary)).await {
            Ok(()) => {
                debug!(
                    total_inbound = %summary.total_inbound,
                    total_outbound = %summary.total_outbound,
                    remainder = %summary.remainder,
                    "report_summary_sent"
                );
                true
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "report_summary_failed");
                false
            }
        }
    }

    async fn reset(&self) -> bool {
        match self.put_json("", &initial_structure(crate::domain::epoch_ms())).await {
            Ok(()) => {
                info!(url = %self.base_url, "firebase_reset");
                true
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "firebase_reset_failed");
                false
            }
        }
    }
}
