//! Prometheus metrics exporter (grounded on the teacher's `metrics.rs`):
//! install the recorder, expose `/metrics`, and pre-register the pipeline's
//! counters/gauges at zero so they appear in scrapes before the first tick
//! runs.

use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::info;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("pipeline.tick.duration.seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("failed to set buckets for pipeline.tick.duration.seconds")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Background task updating process-level gauges every 5 seconds.
pub async fn process_metrics_task() {
    let start_time = Instant::now();
    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
                for line in status.lines() {
                    if line.starts_with("VmRSS:")
                        && let Some(kb_str) = line.split_whitespace().nth(1)
                        && let Ok(kb) = kb_str.parse::<f64>()
                    {
                        metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Zero out every pipeline metric so it appears in Prometheus queries even
/// before the first tick of each task has run.
pub fn initialize_pipeline_metrics() {
    metrics::counter!("pipeline.poll.ticks").absolute(0);
    metrics::counter!("pipeline.poll.failures").absolute(0);
    metrics::counter!("pipeline.flush.ticks").absolute(0);
    metrics::counter!("pipeline.flush.failures").absolute(0);
    metrics::counter!("pipeline.filter.geo.admitted").absolute(0);
    metrics::counter!("pipeline.filter.geo.rejected").absolute(0);
    metrics::counter!("pipeline.filter.pattern.admitted").absolute(0);
    metrics::counter!("pipeline.filter.pattern.rejected").absolute(0);
    metrics::counter!("pipeline.sector.transitions").absolute(0);
    metrics::counter!("pipeline.session.completed").absolute(0);
    metrics::gauge!("pipeline.buffer.depth").set(0.0);
}

/// Start a standalone metrics server on the given port, separate from the
/// dashboard-facing REST shell in `web.rs`.
pub async fn start_metrics_server(port: u16) {
    let handle = init_metrics();
    METRICS_HANDLE
        .set(handle)
        .expect("metrics handle already initialized");
    initialize_pipeline_metrics();

    tokio::spawn(process_metrics_task());

    let app = Router::new().route(
        "/metrics",
        get(|| async {
            let handle = METRICS_HANDLE.get().expect("metrics handle not initialized");
            handle.render()
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("metrics server listening on http://{}/metrics", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind metrics server");
    axum::serve(listener, app).await.expect("metrics server failed");
}
