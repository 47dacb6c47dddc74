//! Backup volume annotation policy
//!
//! Decides whether a Pod's `backup.velero.io/backup-volumes` annotation is
//! missing volumes and computes the corrected value. The merge is additive:
//! entries already present are kept in their original order, even when they
//! no longer match a mounted volume, and missing volumes are appended in
//! declaration order.

use std::collections::HashSet;

use crate::config::ControllerConfig;
use crate::model::{PodPhase, PodSnapshot};

/// Annotation consumed by Velero to select the volumes to back up
pub const BACKUP_VOLUMES_ANNOTATION: &str = "backup.velero.io/backup-volumes";

/// Namespaces with this prefix belong to the cluster and are never touched
pub const SYSTEM_NAMESPACE_PREFIX: &str = "kube-";

const SEPARATOR: char = ',';

/// Outcome of evaluating one Pod snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    pub needs_patch: bool,
    /// Full annotation value to write when `needs_patch` is set
    pub new_value: String,
    /// Volume names absent from the current annotation
    pub missing: Vec<String>,
}

impl Decision {
    /// Decision that leaves the Pod untouched
    pub fn skip() -> Self {
        Self::default()
    }
}

/// Which Pods and volumes are reconciled
#[derive(Clone, Debug)]
pub struct AnnotationPolicy {
    namespaces: Option<Vec<String>>,
    pvcs_only: bool,
}

impl Default for AnnotationPolicy {
    fn default() -> Self {
        Self {
            namespaces: None,
            pvcs_only: true,
        }
    }
}

impl AnnotationPolicy {
    pub fn new(namespaces: Option<Vec<String>>, pvcs_only: bool) -> Self {
        Self {
            namespaces,
            pvcs_only,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.namespaces.clone(), config.pvcs_only)
    }

    /// Whether the Pod is subject to reconciliation at all
    pub fn is_eligible(&self, pod: &PodSnapshot) -> bool {
        if pod.namespace.starts_with(SYSTEM_NAMESPACE_PREFIX) {
            return false;
        }

        if let Some(namespaces) = &self.namespaces {
            if !namespaces.iter().any(|ns| *ns == pod.namespace) {
                return false;
            }
        }

        pod.phase == PodPhase::Running
    }

    /// Compute the annotation correction for a Pod snapshot
    pub fn evaluate(&self, pod: &PodSnapshot) -> Decision {
        if !self.is_eligible(pod) {
            return Decision::skip();
        }

        let volumes: Vec<&str> = pod
            .volumes
            .iter()
            .filter(|volume| volume.persistent_claim || !self.pvcs_only)
            .map(|volume| volume.name.as_str())
            .collect();

        if volumes.is_empty() {
            return Decision::skip();
        }

        let annotated = split_annotation(pod.annotation(BACKUP_VOLUMES_ANNOTATION));
        let mut seen: HashSet<&str> = annotated.iter().copied().collect();

        // `insert` doubles as de-duplication of repeated volume names.
        let missing: Vec<String> = volumes
            .into_iter()
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            return Decision::skip();
        }

        let new_value = annotated
            .iter()
            .copied()
            .chain(missing.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",");

        Decision {
            needs_patch: true,
            new_value,
            missing,
        }
    }
}

/// Evaluate a Pod against the default policy
pub fn evaluate(pod: &PodSnapshot) -> Decision {
    AnnotationPolicy::default().evaluate(pod)
}

/// Split an annotation value into volume names, dropping blank segments
pub fn split_annotation(value: Option<&str>) -> Vec<&str> {
    value
        .map(|value| {
            value
                .split(SEPARATOR)
                .filter(|name| !name.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PodVolume;

    fn running(namespace: &str) -> PodSnapshot {
        PodSnapshot::new(namespace, "web-1", PodPhase::Running)
    }

    #[test]
    fn test_split_annotation_drops_blank_segments() {
        assert_eq!(split_annotation(Some("a,,b,")), vec!["a", "b"]);
        assert_eq!(split_annotation(Some("")), Vec::<&str>::new());
        assert_eq!(split_annotation(None), Vec::<&str>::new());
    }

    #[test]
    fn test_blank_segments_are_dropped_from_new_value() {
        let pod = running("default")
            .with_volume(PodVolume::claim("b"))
            .with_annotation(BACKUP_VOLUMES_ANNOTATION, "a,,");

        let decision = evaluate(&pod);
        assert!(decision.needs_patch);
        assert_eq!(decision.new_value, "a,b");
    }

    #[test]
    fn test_blank_annotation_counts_as_empty() {
        let pod = running("default")
            .with_volume(PodVolume::claim("data"))
            .with_annotation(BACKUP_VOLUMES_ANNOTATION, ",");

        assert_eq!(evaluate(&pod).new_value, "data");
    }

    #[test]
    fn test_duplicate_volume_names_appended_once() {
        let pod = running("default")
            .with_volume(PodVolume::claim("data"))
            .with_volume(PodVolume::claim("data"));

        let decision = evaluate(&pod);
        assert_eq!(decision.new_value, "data");
        assert_eq!(decision.missing, vec!["data".to_string()]);
    }

    #[test]
    fn test_ephemeral_volumes_ignored_by_default() {
        let pod = running("default").with_volume(PodVolume::ephemeral("tmp"));
        assert!(!evaluate(&pod).needs_patch);
    }

    #[test]
    fn test_all_volumes_when_not_pvcs_only() {
        let policy = AnnotationPolicy::new(None, false);
        let pod = running("default")
            .with_volume(PodVolume::ephemeral("tmp"))
            .with_volume(PodVolume::claim("data"));

        assert_eq!(policy.evaluate(&pod).new_value, "tmp,data");
    }

    #[test]
    fn test_namespace_filter() {
        let policy = AnnotationPolicy::new(Some(vec!["apps".to_string()]), true);
        let in_filter = running("apps").with_volume(PodVolume::claim("data"));
        let outside = running("default").with_volume(PodVolume::claim("data"));

        assert!(policy.evaluate(&in_filter).needs_patch);
        assert!(!policy.evaluate(&outside).needs_patch);
    }

    #[test]
    fn test_namespace_filter_never_admits_system_namespaces() {
        let policy = AnnotationPolicy::new(Some(vec!["kube-system".to_string()]), true);
        let pod = running("kube-system").with_volume(PodVolume::claim("data"));
        assert!(!policy.evaluate(&pod).needs_patch);
    }
}
