//! Prometheus metrics HTTP endpoint
//!
//! Exposes engine metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
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

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
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
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(4096);

    write_command_metrics(&mut output, site_id, &summary);
    write_fanout_metrics(&mut output, site_id, &summary);
    write_simulation_metrics(&mut output, site_id, &summary);

    output
}

fn write_command_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "twin_commands_total",
        "Total client commands processed",
        MetricType::Counter,
        site,
        summary.commands_total,
    );
    let _ = writeln!(output, "# HELP twin_commands_per_sec Commands processed per second");
    let _ = writeln!(output, "# TYPE twin_commands_per_sec gauge");
    let _ =
        writeln!(output, "twin_commands_per_sec{{site=\"{site}\"}} {:.2}", summary.commands_per_sec);
    write_metric(
        output,
        "twin_commands_rejected_total",
        "Commands answered with an error envelope",
        MetricType::Counter,
        site,
        summary.commands_rejected,
    );

    write_histogram(
        output,
        "twin_command_latency_us",
        "Command handling latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.avg_command_latency_us,
    );
    write_metric(
        output,
        "twin_command_latency_p50_us",
        "50th percentile command latency",
        MetricType::Gauge,
        site,
        summary.lat_p50_us,
    );
    write_metric(
        output,
        "twin_command_latency_p95_us",
        "95th percentile command latency",
        MetricType::Gauge,
        site,
        summary.lat_p95_us,
    );
    write_metric(
        output,
        "twin_command_latency_p99_us",
        "99th percentile command latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );
}

fn write_fanout_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "twin_events_emitted_total",
        "Domain events drained from the event channel",
        MetricType::Counter,
        site,
        summary.events_emitted,
    );
    write_metric(
        output,
        "twin_frames_sent_total",
        "Frames delivered to connection queues",
        MetricType::Counter,
        site,
        summary.frames_sent,
    );
    write_metric(
        output,
        "twin_frames_dropped_total",
        "Frames dropped due to full connection queues",
        MetricType::Counter,
        site,
        summary.frames_dropped,
    );
    write_metric(
        output,
        "twin_connections_opened_total",
        "Connections ever opened",
        MetricType::Counter,
        site,
        summary.connections_opened,
    );
    write_metric(
        output,
        "twin_connections_active",
        "Currently open connections",
        MetricType::Gauge,
        site,
        summary.active_connections,
    );
}

fn write_simulation_metrics(output: &mut String, site: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "twin_ticks_total",
        "Simulation ticks run across all domains",
        MetricType::Counter,
        site,
        summary.ticks_total,
    );
    write_metric(
        output,
        "twin_customers_active",
        "Virtual customers currently on the floor",
        MetricType::Gauge,
        site,
        summary.active_customers as u64,
    );
    write_metric(
        output,
        "twin_alerts_active",
        "Security alerts in active status",
        MetricType::Gauge,
        site,
        summary.active_alerts as u64,
    );
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "metrics_server_started");

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
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "metrics_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "metrics_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();

        metrics.record_command(150);
        metrics.record_command(250);
        metrics.record_frame_sent();
        metrics.record_connection_opened();
        metrics.set_world_gauges(5, 2);

        let output = format_prometheus_metrics(&metrics, "demo");

        assert!(output.contains("twin_commands_total{site=\"demo\"} 2"));
        assert!(output.contains("twin_command_latency_us_bucket{site=\"demo\""));
        assert!(output.contains("twin_frames_sent_total{site=\"demo\"} 1"));
        assert!(output.contains("twin_customers_active{site=\"demo\"} 5"));
        assert!(output.contains("twin_alerts_active{site=\"demo\"} 2"));
        assert!(output.contains("twin_connections_active{site=\"demo\"} 1"));
    }
}
