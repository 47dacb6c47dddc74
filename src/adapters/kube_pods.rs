//! Kubernetes-backed pod source and annotation patcher

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{ListParams, Patch, PatchParams, WatchParams},
    Api, Client,
};
use serde_json::json;

use super::{AnnotationPatcher, PatchOutcome, PodEventSource, PodEventStream};
use crate::error::{Error, Result};
use crate::model::{PodEvent, PodListing, PodSnapshot};

/// Field manager recorded on annotation patches
pub const FIELD_MANAGER: &str = "velero-annotations-controller";

/// Server-side watch timeout; must stay below the API server's 295s limit
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Pod access through the Kubernetes API
#[derive(Clone)]
pub struct KubePods {
    client: Client,
}

impl KubePods {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PodEventSource for KubePods {
    async fn list_pods(&self) -> Result<PodListing> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;

        Ok(PodListing {
            resource_version: list.metadata.resource_version.clone().unwrap_or_default(),
            pods: list.items.iter().map(PodSnapshot::from).collect(),
        })
    }

    async fn watch_pods(&self, resource_version: &str) -> Result<PodEventStream> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let stream = api.watch(&params, resource_version).await?;

        Ok(stream
            .map_ok(PodEvent::from)
            .map_err(|e| Error::watch_stream(e.to_string()))
            .boxed())
    }
}

impl AnnotationPatcher for KubePods {
    async fn patch_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<PatchOutcome> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        // Merge patch addressed by name only, so unrelated fields written
        // concurrently by others are left alone.
        let patch = json!({
            "metadata": {
                "annotations": { key: value }
            }
        });

        match api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(PatchOutcome::Patched),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(PatchOutcome::PodGone),
            Err(other) => Err(Error::Kube(other)),
        }
    }
}
