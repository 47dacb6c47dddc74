//! Pod annotation controller
//!
//! This module contains the reconciliation loop that follows the Pod watch
//! stream and the supervisor that keeps it subscribed.

mod pod_controller;
mod supervisor;

pub use pod_controller::{PodController, ReconcileOutcome, SessionEnd, WatchSession};
pub use supervisor::{supervise, supervise_with, Backoff, MAX_BACKOFF};
