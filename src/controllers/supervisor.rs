//! Watch supervisor
//!
//! Owns the transition into the watching state. The first listing must
//! succeed or the controller refuses to start. Afterwards:
//! - a stream closed cleanly by the server is resumed from the last seen
//!   resource version
//! - an expired or failed stream is followed by a re-list and resubscribe,
//!   with exponential backoff between attempts

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{PodController, SessionEnd};
use crate::adapters::{AnnotationPatcher, PodEventSource};
use crate::error::{Error, Result};

/// Upper bound for the resubscribe backoff
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff between resubscribe attempts
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// `initial` is clamped to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |doubled| doubled.min(self.max));
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run the controller until `cancel` fires.
///
/// Only a failure of the very first listing is returned as an error.
pub async fn supervise<S, P>(
    controller: &PodController<S, P>,
    mut backoff: Backoff,
    cancel: CancellationToken,
) -> Result<()>
where
    S: PodEventSource,
    P: AnnotationPatcher,
{
    let mut resource_version = controller.sync_existing().await?;

    loop {
        let end = match controller.watch(&resource_version, &cancel).await {
            Ok(end) => end,
            Err(e) => {
                error!(error = %e, "Failed to open pods watch");
                SessionEnd::Failed(e.to_string())
            }
        };

        match end {
            SessionEnd::Shutdown => {
                info!("Pods watch closed on shutdown");
                return Ok(());
            }
            SessionEnd::Closed { resume_from } if !resume_from.is_empty() => {
                backoff.reset();
                resource_version = resume_from;
            }
            other => {
                warn!(reason = ?other, "Pods watch lost, re-listing");
                match relist(controller, &mut backoff, &cancel).await {
                    Some(version) => resource_version = version,
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Run [`supervise`] next to a companion task such as the metrics server.
///
/// If the companion finishes first, the watch is shut down through `cancel`
/// and the companion's exit reason is returned as [`Error::TaskExited`].
pub async fn supervise_with<S, P, F>(
    controller: &PodController<S, P>,
    backoff: Backoff,
    cancel: CancellationToken,
    task: &'static str,
    companion: F,
) -> Result<()>
where
    S: PodEventSource,
    P: AnnotationPatcher,
    F: Future<Output = String>,
{
    let supervisor = supervise(controller, backoff, cancel.clone());
    tokio::pin!(supervisor);

    tokio::select! {
        result = &mut supervisor => result,
        reason = companion => {
            error!(task = task, reason = %reason, "Task exited unexpectedly, stopping controller");
            cancel.cancel();
            if let Err(e) = supervisor.await {
                error!(error = %e, "Controller stopped with error");
            }
            Err(Error::TaskExited { task, reason })
        }
    }
}

/// Re-list until it succeeds; `None` when cancelled while waiting
async fn relist<S, P>(
    controller: &PodController<S, P>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Option<String>
where
    S: PodEventSource,
    P: AnnotationPatcher,
{
    loop {
        let delay = backoff.next_delay();
        info!(delay = ?delay, "Waiting before resubscribing");

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        match controller.sync_existing().await {
            Ok(version) => return Some(version),
            Err(e) => error!(error = %e, "Failed to re-list pods"),
        }
    }
}
