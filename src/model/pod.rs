//! Pod snapshot

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

/// Lifecycle phase reported in a Pod's status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the phase string reported by the API server.
    ///
    /// A missing or unrecognised phase is reported as `Unknown`.
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A volume mounted by a Pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodVolume {
    pub name: String,
    /// Whether the volume is backed by a persistent volume claim
    pub persistent_claim: bool,
}

impl PodVolume {
    pub fn claim(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistent_claim: true,
        }
    }

    pub fn ephemeral(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistent_claim: false,
        }
    }
}

/// Immutable view of a Pod at the time an event was observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSnapshot {
    pub namespace: String,
    pub name: String,
    pub phase: PodPhase,
    /// Volumes in declaration order
    pub volumes: Vec<PodVolume>,
    pub annotations: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl PodSnapshot {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            phase,
            volumes: Vec::new(),
            annotations: BTreeMap::new(),
            resource_version: None,
        }
    }

    pub fn with_volume(mut self, volume: PodVolume) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_version(mut self, resource_version: impl Into<String>) -> Self {
        self.resource_version = Some(resource_version.into());
        self
    }

    /// `namespace/name` key identifying the Pod
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl From<&Pod> for PodSnapshot {
    fn from(pod: &Pod) -> Self {
        let volumes = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.volumes.as_ref())
            .map(|volumes| {
                volumes
                    .iter()
                    .map(|volume| PodVolume {
                        name: volume.name.clone(),
                        persistent_claim: volume.persistent_volume_claim.is_some(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let phase = PodPhase::parse(
            pod.status
                .as_ref()
                .and_then(|status| status.phase.as_deref()),
        );

        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            phase,
            volumes,
            annotations: pod.annotations().clone(),
            resource_version: pod.resource_version(),
        }
    }
}

impl From<Pod> for PodSnapshot {
    fn from(pod: Pod) -> Self {
        PodSnapshot::from(&pod)
    }
}

/// Result of the initial full listing of Pods
#[derive(Clone, Debug, Default)]
pub struct PodListing {
    pub pods: Vec<PodSnapshot>,
    /// Resource version the watch resumes from
    pub resource_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        PersistentVolumeClaimVolumeSource, PodSpec, PodStatus, Volume,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod_with(volumes: Option<Vec<Volume>>, phase: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-1".to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some("42".to_string()),
                annotations: Some(BTreeMap::from([(
                    "team".to_string(),
                    "storage".to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                volumes,
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_snapshot_from_pod() {
        let volumes = vec![
            Volume {
                name: "data".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: "data-pvc".to_string(),
                    read_only: None,
                }),
                ..Default::default()
            },
            Volume {
                name: "cache".to_string(),
                ..Default::default()
            },
        ];

        let snapshot = PodSnapshot::from(&pod_with(Some(volumes), Some("Running")));

        assert_eq!(snapshot.key(), "default/web-1");
        assert_eq!(snapshot.phase, PodPhase::Running);
        assert_eq!(
            snapshot.volumes,
            vec![PodVolume::claim("data"), PodVolume::ephemeral("cache")]
        );
        assert_eq!(snapshot.annotation("team"), Some("storage"));
        assert_eq!(snapshot.resource_version.as_deref(), Some("42"));
    }

    #[test]
    fn test_snapshot_tolerates_missing_fields() {
        let snapshot = PodSnapshot::from(&pod_with(None, None));
        assert!(snapshot.volumes.is_empty());
        assert_eq!(snapshot.phase, PodPhase::Unknown);
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!(PodPhase::parse(Some("Pending")), PodPhase::Pending);
        assert_eq!(PodPhase::parse(Some("Succeeded")), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse(Some("running")), PodPhase::Unknown);
        assert_eq!(PodPhase::Failed.to_string(), "Failed");
    }
}
