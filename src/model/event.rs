//! Pod watch events

use k8s_openapi::api::core::v1::Pod;
use kube::api::WatchEvent;

use super::PodSnapshot;

/// HTTP status the API server uses when a watch resource version is too old
pub const GONE: u16 = 410;

/// One notification received from the Pod watch stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PodEvent {
    Added(PodSnapshot),
    Modified(PodSnapshot),
    Deleted(PodSnapshot),
    /// Progress marker carrying only a resource version
    Bookmark { resource_version: String },
    /// Error object delivered in-band by the API server
    Error { code: u16, message: String },
}

impl PodEvent {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PodEvent::Added(_) => "added",
            PodEvent::Modified(_) => "modified",
            PodEvent::Deleted(_) => "deleted",
            PodEvent::Bookmark { .. } => "bookmark",
            PodEvent::Error { .. } => "error",
        }
    }

    /// Resource version carried by the event, if any
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            PodEvent::Added(pod) | PodEvent::Modified(pod) | PodEvent::Deleted(pod) => {
                pod.resource_version.as_deref()
            }
            PodEvent::Bookmark { resource_version } => Some(resource_version),
            PodEvent::Error { .. } => None,
        }
    }

    /// Whether the event reports that the watched resource version expired
    pub fn is_expired(&self) -> bool {
        matches!(self, PodEvent::Error { code, .. } if *code == GONE)
    }
}

impl From<WatchEvent<Pod>> for PodEvent {
    fn from(event: WatchEvent<Pod>) -> Self {
        match event {
            WatchEvent::Added(pod) => PodEvent::Added(PodSnapshot::from(&pod)),
            WatchEvent::Modified(pod) => PodEvent::Modified(PodSnapshot::from(&pod)),
            WatchEvent::Deleted(pod) => PodEvent::Deleted(PodSnapshot::from(&pod)),
            WatchEvent::Bookmark(bookmark) => PodEvent::Bookmark {
                resource_version: bookmark.metadata.resource_version,
            },
            WatchEvent::Error(error) => PodEvent::Error {
                code: error.code,
                message: error.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PodPhase;

    #[test]
    fn test_resource_version_of_events() {
        let pod = PodSnapshot::new("default", "web-1", PodPhase::Running).with_resource_version("7");
        assert_eq!(PodEvent::Modified(pod).resource_version(), Some("7"));

        let bookmark = PodEvent::Bookmark {
            resource_version: "9".to_string(),
        };
        assert_eq!(bookmark.resource_version(), Some("9"));
        assert_eq!(bookmark.kind(), "bookmark");
    }

    #[test]
    fn test_expired_error() {
        let gone = PodEvent::Error {
            code: GONE,
            message: "too old resource version".to_string(),
        };
        assert!(gone.is_expired());

        let other = PodEvent::Error {
            code: 500,
            message: "internal".to_string(),
        };
        assert!(!other.is_expired());
    }

    fn pod_json(resource_version: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web-1",
                "namespace": "default",
                "resourceVersion": resource_version,
                "annotations": {"backup.velero.io/backup-volumes": "data"}
            },
            "spec": {
                "containers": [],
                "volumes": [{"name": "data", "persistentVolumeClaim": {"claimName": "data-pvc"}}]
            },
            "status": {"phase": "Running"}
        })
    }

    fn from_json(value: serde_json::Value) -> PodEvent {
        let event: WatchEvent<Pod> = serde_json::from_value(value).unwrap();
        PodEvent::from(event)
    }

    #[test]
    fn test_from_watch_added_and_modified() {
        let added = from_json(serde_json::json!({"type": "ADDED", "object": pod_json("5")}));
        let PodEvent::Added(pod) = &added else {
            panic!("expected added event, got {:?}", added);
        };
        assert_eq!(pod.key(), "default/web-1");
        assert_eq!(pod.phase, PodPhase::Running);
        assert!(pod.volumes[0].persistent_claim);
        assert_eq!(pod.annotation("backup.velero.io/backup-volumes"), Some("data"));
        assert_eq!(added.resource_version(), Some("5"));

        let modified = from_json(serde_json::json!({"type": "MODIFIED", "object": pod_json("6")}));
        assert_eq!(modified.kind(), "modified");
        assert_eq!(modified.resource_version(), Some("6"));
    }

    #[test]
    fn test_from_watch_deleted_and_bookmark() {
        let deleted = from_json(serde_json::json!({"type": "DELETED", "object": pod_json("7")}));
        assert_eq!(deleted.kind(), "deleted");

        let bookmark = from_json(serde_json::json!({
            "type": "BOOKMARK",
            "object": {
                "kind": "Pod",
                "apiVersion": "v1",
                "metadata": {"resourceVersion": "8"}
            }
        }));
        assert_eq!(
            bookmark,
            PodEvent::Bookmark {
                resource_version: "8".to_string()
            }
        );
    }

    #[test]
    fn test_from_watch_error() {
        let event: WatchEvent<Pod> = serde_json::from_value(serde_json::json!({
            "type": "ERROR",
            "object": {
                "status": "Failure",
                "message": "too old resource version: 1 (2)",
                "reason": "Expired",
                "code": 410
            }
        }))
        .unwrap();

        assert!(PodEvent::from(event).is_expired());
    }
}
