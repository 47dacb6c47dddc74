//! Adapters between the controller and the Kubernetes API

mod cluster;
mod kube_pods;

pub use cluster::*;
pub use kube_pods::*;
