//! Pod annotation controller
//!
//! Lists every Pod once, then follows the Pod watch stream and patches the
//! backup volume annotation whenever the annotation policy reports missing
//! volumes. Events are handled one at a time in arrival order, so two events
//! for the same Pod are never reconciled concurrently.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{AnnotationPatcher, PatchOutcome, PodEventSource, PodEventStream};
use crate::error::{Error, Result};
use crate::metrics;
use crate::model::{PodEvent, PodSnapshot};
use crate::reconcilers::{AnnotationPolicy, BACKUP_VOLUMES_ANNOTATION};

/// Result of handling a single Pod snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do: ineligible Pod or annotation already complete
    Unchanged,
    Patched,
    /// The Pod disappeared before it could be patched
    PodGone,
    /// The patch failed; the next event for the Pod retries
    Failed,
}

impl ReconcileOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::Patched => "patched",
            ReconcileOutcome::PodGone => "pod_gone",
            ReconcileOutcome::Failed => "error",
        }
    }
}

/// Why a watch session stopped
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The shutdown signal fired
    Shutdown,
    /// The server ended the stream cleanly
    Closed { resume_from: String },
    /// The watched resource version is no longer available
    Expired,
    /// The stream failed
    Failed(String),
}

impl SessionEnd {
    fn label(&self) -> &'static str {
        match self {
            SessionEnd::Shutdown => "shutdown",
            SessionEnd::Closed { .. } => "closed",
            SessionEnd::Expired => "expired",
            SessionEnd::Failed(_) => "failed",
        }
    }
}

/// One open subscription to the Pod watch stream
pub struct WatchSession {
    stream: PodEventStream,
    resource_version: String,
    events: u64,
}

impl WatchSession {
    async fn open<S: PodEventSource>(source: &S, resource_version: &str) -> Result<Self> {
        let stream = source.watch_pods(resource_version).await?;
        metrics::CONTROLLER_HEALTH.set(1.0);
        info!(resource_version = %resource_version, "Pods watch started");

        Ok(Self {
            stream,
            resource_version: resource_version.to_string(),
            events: 0,
        })
    }

    async fn next(&mut self) -> Option<Result<PodEvent>> {
        let event = self.stream.next().await;
        if let Some(Ok(event)) = &event {
            self.events += 1;
            if let Some(version) = event.resource_version() {
                self.resource_version = version.to_string();
            }
        }
        event
    }

    /// Last resource version observed on this session
    pub fn resource_version(&self) -> &str {
        &self.resource_version
    }

    /// Close the session, releasing the underlying connection
    fn close(self, end: &SessionEnd) {
        let Self {
            stream,
            resource_version,
            events,
        } = self;
        drop(stream);

        metrics::CONTROLLER_HEALTH.set(0.0);
        metrics::WATCH_SESSIONS.with_label_values(&[end.label()]).inc();
        info!(
            end = end.label(),
            events = events,
            resource_version = %resource_version,
            "Pods watch stopped"
        );
    }
}

/// Reconciliation loop over the Pod event stream
pub struct PodController<S, P> {
    source: S,
    patcher: P,
    policy: AnnotationPolicy,
    request_timeout: Duration,
}

impl<S, P> PodController<S, P>
where
    S: PodEventSource,
    P: AnnotationPatcher,
{
    pub fn new(source: S, patcher: P, policy: AnnotationPolicy, request_timeout: Duration) -> Self {
        Self {
            source,
            patcher,
            policy,
            request_timeout,
        }
    }

    /// List all Pods and converge each of them.
    ///
    /// Returns the resource version the watch should start from. A listing
    /// failure is returned to the caller; individual patch failures are not.
    pub async fn sync_existing(&self) -> Result<String> {
        info!("Synchronizing pods");
        let listing =
            with_timeout("list pods", self.request_timeout, self.source.list_pods()).await?;

        let mut patched = 0usize;
        for pod in &listing.pods {
            if self.handle_pod(pod).await == ReconcileOutcome::Patched {
                patched += 1;
            }
        }

        info!(
            pods = listing.pods.len(),
            patched = patched,
            resource_version = %listing.resource_version,
            "Pods synchronized"
        );
        Ok(listing.resource_version)
    }

    /// Follow the watch stream from `resource_version` until it ends or
    /// `cancel` fires. The session is closed exactly once before returning.
    pub async fn watch(
        &self,
        resource_version: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd> {
        if cancel.is_cancelled() {
            return Ok(SessionEnd::Shutdown);
        }

        let mut session = WatchSession::open(&self.source, resource_version).await?;

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break SessionEnd::Shutdown,
                next = session.next() => next,
            };

            let event = match next {
                None => {
                    break SessionEnd::Closed {
                        resume_from: session.resource_version().to_string(),
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Pods watch failed");
                    break SessionEnd::Failed(e.to_string());
                }
                Some(Ok(event)) => event,
            };

            metrics::POD_EVENTS.with_label_values(&[event.kind()]).inc();

            if event.is_expired() {
                warn!(event = ?event, "Watched resource version expired");
                break SessionEnd::Expired;
            }

            match event {
                PodEvent::Added(pod) | PodEvent::Modified(pod) => {
                    self.handle_pod(&pod).await;
                }
                PodEvent::Deleted(pod) => {
                    debug!(pod = %pod.key(), "Pod deleted");
                }
                PodEvent::Bookmark { .. } => {}
                PodEvent::Error { code, message } => {
                    warn!(code = code, message = %message, "Error event on pods watch");
                }
            }
        };

        session.close(&end);
        Ok(end)
    }

    /// Evaluate one Pod and patch its annotation if volumes are missing
    #[instrument(skip(self, pod), fields(namespace = %pod.namespace, name = %pod.name))]
    pub async fn handle_pod(&self, pod: &PodSnapshot) -> ReconcileOutcome {
        let outcome = self.reconcile(pod).await;
        metrics::RECONCILIATIONS
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn reconcile(&self, pod: &PodSnapshot) -> ReconcileOutcome {
        if !self.policy.is_eligible(pod) {
            debug!(phase = %pod.phase, "Pod not eligible, skipping");
            return ReconcileOutcome::Unchanged;
        }

        let decision = self.policy.evaluate(pod);
        if !decision.needs_patch {
            return ReconcileOutcome::Unchanged;
        }

        warn!(
            current = pod.annotation(BACKUP_VOLUMES_ANNOTATION).unwrap_or(""),
            missing = ?decision.missing,
            "Reconciling velero annotations"
        );

        let _timer = metrics::PATCH_DURATION.start_timer();
        let result = with_timeout(
            "patch pod annotation",
            self.request_timeout,
            self.patcher.patch_annotation(
                &pod.namespace,
                &pod.name,
                BACKUP_VOLUMES_ANNOTATION,
                &decision.new_value,
            ),
        )
        .await;

        match result {
            Ok(PatchOutcome::Patched) => {
                info!(value = %decision.new_value, "Patched velero annotation");
                ReconcileOutcome::Patched
            }
            Ok(PatchOutcome::PodGone) => {
                debug!("Pod no longer exists, skipping");
                ReconcileOutcome::PodGone
            }
            Err(e) => {
                error!(error = %e, "Failed to patch velero annotation");
                ReconcileOutcome::Failed
            }
        }
    }
}

async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::timeout(operation, after))?
}
