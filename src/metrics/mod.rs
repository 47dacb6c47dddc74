//! Prometheus metrics for the Velero Annotations Controller
//!
//! This module exposes metrics for monitoring controller health and convergence.

mod prometheus;

pub use prometheus::*;
