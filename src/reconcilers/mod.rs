//! Reconciliation policies
//!
//! Pure decision logic, free of any cluster I/O:
//! - Pod eligibility (system namespaces, namespace filter, phase)
//! - Backup volume annotation merge

pub mod annotations;

pub use annotations::{evaluate, AnnotationPolicy, Decision, BACKUP_VOLUMES_ANNOTATION};
