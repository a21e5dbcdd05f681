//! Prometheus metrics HTTP endpoint
//!
//! Exposes station metrics in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a counter split by tracking mode
fn write_mode_counter(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    inbound: u64,
    outbound: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name}{{site=\"{site}\",mode=\"inbound\"}} {inbound}");
    let _ = writeln!(output, "{name}{{site=\"{site}\",mode=\"outbound\"}} {outbound}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    // Scrapes must not reset the periodic log window
    let summary = metrics.snapshot();
    let mut output = String::with_capacity(4096);

    write_frame_metrics(&mut output, site_id, &summary);
    write_tracking_metrics(&mut output, site_id, &summary);
    write_report_metrics(&mut output, site_id, &summary);

    output
}

fn write_frame_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "scan_gate_frames_total",
        "Frames received from the decoder",
        MetricType::Counter,
        site,
        summary.frames_total,
    );
    write_metric(
        output,
        "scan_gate_decoded_frames_total",
        "Frames that carried a decoded code",
        MetricType::Counter,
        site,
        summary.decoded_frames_total,
    );
    write_metric(
        output,
        "scan_gate_frames_dropped_total",
        "Frames dropped because the station queue was full",
        MetricType::Counter,
        site,
        summary.frames_dropped,
    );
    write_histogram(
        output,
        "scan_gate_frame_latency_us",
        "Frame processing latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.lat_sum_us,
    );
    write_metric(
        output,
        "scan_gate_frame_latency_p99_us",
        "99th percentile frame processing latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
}

fn write_tracking_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "scan_gate_observations_accepted_total",
        "Observations that passed the cooldown check",
        MetricType::Counter,
        site,
        summary.observations_accepted,
    );
    write_metric(
        output,
        "scan_gate_cooldown_rejected_total",
        "Observations rejected inside the re-detection gap",
        MetricType::Counter,
        site,
        summary.cooldown_rejected,
    );
    write_metric(
        output,
        "scan_gate_throttled_frames_total",
        "Decoded frames skipped by the new-object throttle",
        MetricType::Counter,
        site,
        summary.throttled_frames,
    );
    write_metric(
        output,
        "scan_gate_new_objects_total",
        "Objects admitted into tracking",
        MetricType::Counter,
        site,
        summary.new_objects_total,
    );
    write_mode_counter(
        output,
        "scan_gate_events_total",
        "Counted events by mode",
        site,
        summary.events_inbound,
        summary.events_outbound,
    );
    write_metric(
        output,
        "scan_gate_expired_total",
        "Tracked objects removed after their display window",
        MetricType::Counter,
        site,
        summary.expired_total,
    );
    write_metric(
        output,
        "scan_gate_active_objects",
        "Objects currently displayed",
        MetricType::Gauge,
        site,
        summary.active_objects,
    );
}

fn write_report_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "scan_gate_reports_sent_total",
        "Reports delivered to the remote store",
        MetricType::Counter,
        site,
        summary.reports_sent,
    );
    write_metric(
        output,
        "scan_gate_reports_failed_total",
        "Reports the remote store rejected or that timed out",
        MetricType::Counter,
        site,
        summary.reports_failed,
    );
    write_metric(
        output,
        "scan_gate_reports_dropped_total",
        "Reports dropped because the report queue was full",
        MetricType::Counter,
        site,
        summary.reports_dropped,
    );
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), &metrics, &site_id))
}

fn route(method: &Method, path: &str, metrics: &Metrics, site_id: &str) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(metrics, site_id),
        ),
        (&Method::GET, "/health") => response(StatusCode::OK, "text/plain", "ok".to_string()),
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {addr}"))?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), site_id.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
