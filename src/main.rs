//! Velero Annotations Controller
//!
//! Main entry point for the controller. Loads configuration, sets up the
//! Kubernetes client, and runs the pod reconciliation loop until shutdown.

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use velero_annotations_controller::{
    adapters::KubePods,
    config::ControllerConfig,
    controllers::{self, Backoff, PodController},
    metrics,
    reconcilers::AnnotationPolicy,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Velero Annotations Controller");

    let config = ControllerConfig::from_env()?;
    match &config.namespaces {
        Some(namespaces) => info!(namespaces = ?namespaces, "Watching selected namespaces"),
        None => info!("Watching all namespaces"),
    }
    info!(pvcs_only = config.pvcs_only, "Volume selection configured");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port));
    info!("Metrics server starting on port {}", config.metrics_port);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Received shutdown signal, stopping controller");
            cancel.cancel();
        }
    });

    let pods = KubePods::new(client);
    let controller = PodController::new(
        pods.clone(),
        pods,
        AnnotationPolicy::from_config(&config),
        config.request_timeout,
    );
    let backoff = Backoff::new(config.resubscribe_backoff, controllers::MAX_BACKOFF);

    let metrics_exit = async move {
        match metrics_handle.await {
            Ok(Ok(())) => "metrics server stopped".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        }
    };

    if let Err(e) =
        controllers::supervise_with(&controller, backoff, cancel, "metrics server", metrics_exit)
            .await
    {
        error!(error = %e, "Controller failed");
        return Err(e.into());
    }

    info!("Velero Annotations Controller stopped");
    Ok(())
}

/// Initialize tracing subscriber
///
/// JSON output unless `LOG_FORMAT=text`.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    let text = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "text");

    let registry = tracing_subscriber::registry().with(env_filter);
    if text {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
