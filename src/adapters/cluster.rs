//! Cluster collaborators used by the pod controller

use std::future::Future;

use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{PodEvent, PodListing};

/// Stream of Pod events delivered by an open watch
pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// Source of Pod state: one bounded listing plus an unbounded watch
pub trait PodEventSource {
    /// List every Pod currently in the cluster
    fn list_pods(&self) -> impl Future<Output = Result<PodListing>> + Send;

    /// Open a watch starting after `resource_version`
    fn watch_pods(
        &self,
        resource_version: &str,
    ) -> impl Future<Output = Result<PodEventStream>> + Send;
}

/// Result of a successful patch request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched,
    /// The Pod was deleted before the patch reached the API server
    PodGone,
}

/// Writes annotations onto Pods
pub trait AnnotationPatcher {
    /// Set `key` to `value` on the Pod identified by namespace and name
    fn patch_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<PatchOutcome>> + Send;
}
