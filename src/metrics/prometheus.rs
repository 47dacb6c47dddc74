//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Pod events received from the watch stream, by kind
    pub static ref POD_EVENTS: CounterVec = register_counter_vec!(
        "velero_annotations_controller_pod_events_total",
        "Total number of pod events received",
        &["kind"]
    ).unwrap();

    /// Per-Pod reconciliations, by outcome
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "velero_annotations_controller_reconciliations_total",
        "Total number of pod reconciliations by outcome",
        &["outcome"]
    ).unwrap();

    /// Annotation patch latency
    pub static ref PATCH_DURATION: Histogram = register_histogram!(
        "velero_annotations_controller_patch_duration_seconds",
        "Duration of annotation patch requests in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Closed watch sessions, by how they ended
    pub static ref WATCH_SESSIONS: CounterVec = register_counter_vec!(
        "velero_annotations_controller_watch_sessions_total",
        "Total number of closed watch sessions by end reason",
        &["end"]
    ).unwrap();

    /// Controller health (1 = watching, 0 = not watching)
    pub static ref CONTROLLER_HEALTH: Gauge = register_gauge!(
        "velero_annotations_controller_health",
        "Controller health status (1 = watching, 0 = not watching)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Route a request to the metrics, liveness or readiness handler
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" if CONTROLLER_HEALTH.get() > 0.0 => {
            text_response(StatusCode::OK, "ok")
        }
        "/readyz" | "/ready" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not watching"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Encode the default registry in the Prometheus text format
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
