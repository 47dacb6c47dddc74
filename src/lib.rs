//! Velero Annotations Controller
//!
//! Keeps the `backup.velero.io/backup-volumes` annotation of running Pods in
//! sync with the persistent volume claims they mount.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod error;
pub mod metrics;
pub mod model;
pub mod reconcilers;

pub use error::{Error, Result};
