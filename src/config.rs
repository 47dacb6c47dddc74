//! Controller configuration
//!
//! Every setting comes from an environment variable and falls back to a
//! default that annotates PVC volumes in all (non-system) namespaces.

use std::time::Duration;

use crate::error::{Error, Result};

/// Comma-separated allow-list of namespaces to reconcile
pub const NS_FILTER_ENV: &str = "VELERO_ANNOTATIONS_CONTROLLER_NS_FILTER";
/// Set to "false" to annotate every volume, not only persistent claims
pub const PVCS_ONLY_ENV: &str = "VELERO_ANNOTATIONS_CONTROLLER_PVCS_ONLY";
/// Timeout in seconds for the initial listing and each patch request
pub const REQUEST_TIMEOUT_ENV: &str = "VELERO_ANNOTATIONS_CONTROLLER_REQUEST_TIMEOUT_SECS";
/// Port of the metrics and health endpoint
pub const METRICS_PORT_ENV: &str = "VELERO_ANNOTATIONS_CONTROLLER_METRICS_PORT";
/// Initial delay before re-listing after a failed watch session
pub const RESUBSCRIBE_BACKOFF_ENV: &str = "VELERO_ANNOTATIONS_CONTROLLER_RESUBSCRIBE_BACKOFF_SECS";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_METRICS_PORT: u16 = 8080;
const DEFAULT_RESUBSCRIBE_BACKOFF_SECS: u64 = 1;

/// Runtime configuration of the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespaces to reconcile; `None` means all of them
    pub namespaces: Option<Vec<String>>,

    /// Only annotate volumes backed by a persistent volume claim
    pub pvcs_only: bool,

    /// Upper bound for a single listing or patch request
    pub request_timeout: Duration,

    /// Metrics server port
    pub metrics_port: u16,

    /// First backoff delay before re-listing and resubscribing
    pub resubscribe_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespaces: None,
            pvcs_only: true,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            metrics_port: DEFAULT_METRICS_PORT,
            resubscribe_backoff: Duration::from_secs(DEFAULT_RESUBSCRIBE_BACKOFF_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let namespaces = lookup(NS_FILTER_ENV).and_then(|raw| {
            let namespaces: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect();
            (!namespaces.is_empty()).then_some(namespaces)
        });

        // Anything but an explicit "false" keeps the PVC-only behaviour.
        let pvcs_only = lookup(PVCS_ONLY_ENV).map_or(true, |raw| raw.trim() != "false");

        let request_timeout = match lookup(REQUEST_TIMEOUT_ENV) {
            Some(raw) => Duration::from_secs(parse_positive(REQUEST_TIMEOUT_ENV, &raw)?),
            None => defaults.request_timeout,
        };

        let metrics_port = match lookup(METRICS_PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", METRICS_PORT_ENV, raw, e))
            })?,
            None => defaults.metrics_port,
        };

        let resubscribe_backoff = match lookup(RESUBSCRIBE_BACKOFF_ENV) {
            Some(raw) => Duration::from_secs(parse_positive(RESUBSCRIBE_BACKOFF_ENV, &raw)?),
            None => defaults.resubscribe_backoff,
        };

        Ok(Self {
            namespaces,
            pvcs_only,
            request_timeout,
            metrics_port,
            resubscribe_backoff,
        })
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(Error::config(format!("{} must be greater than zero", key))),
        Ok(value) => Ok(value),
        Err(e) => Err(Error::config(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ControllerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(config.pvcs_only);
        assert!(config.namespaces.is_none());
    }

    #[test]
    fn test_namespace_filter_is_split_and_trimmed() {
        let config = config_from(&[(NS_FILTER_ENV, "default, apps,,")]).unwrap();
        assert_eq!(
            config.namespaces,
            Some(vec!["default".to_string(), "apps".to_string()])
        );
    }

    #[test]
    fn test_blank_namespace_filter_means_all() {
        let config = config_from(&[(NS_FILTER_ENV, " , ")]).unwrap();
        assert!(config.namespaces.is_none());
    }

    #[test]
    fn test_pvcs_only_disabled_only_by_false() {
        assert!(!config_from(&[(PVCS_ONLY_ENV, "false")]).unwrap().pvcs_only);
        assert!(config_from(&[(PVCS_ONLY_ENV, "no")]).unwrap().pvcs_only);
        assert!(config_from(&[(PVCS_ONLY_ENV, "true")]).unwrap().pvcs_only);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = config_from(&[(REQUEST_TIMEOUT_ENV, "soon")]).unwrap_err();
        assert!(err.to_string().contains(REQUEST_TIMEOUT_ENV));

        let err = config_from(&[(REQUEST_TIMEOUT_ENV, "0")]).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        assert!(config_from(&[(METRICS_PORT_ENV, "70000")]).is_err());
    }

    #[test]
    fn test_numeric_overrides() {
        let config = config_from(&[
            (REQUEST_TIMEOUT_ENV, "5"),
            (METRICS_PORT_ENV, "9090"),
            (RESUBSCRIBE_BACKOFF_ENV, "2"),
        ])
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.resubscribe_backoff, Duration::from_secs(2));
    }
}
