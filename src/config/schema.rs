//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! service. All types derive Serde traits for deserialization from
//! config files; keys use kebab-case (`buffer-size`, `quit-timeout`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::middleware::MiddlewareSpec;

/// Root configuration for the image service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Listen address. The shorthand ":8080" binds every interface.
    pub address: String,

    /// Requests allowed to wait for a concurrency slot before the
    /// service starts rejecting with 503.
    pub buffer_size: usize,

    /// Ceiling on concurrently executing requests. Must be at least 1.
    pub max_concurrency: usize,

    /// Advisory per-request deadline in milliseconds; 0 disables it.
    pub request_timeout: u64,

    /// Grace period for Quit in milliseconds before in-flight requests
    /// are abandoned.
    pub quit_timeout: u64,

    /// Separate TOML file holding the middleware pipeline. When set, its
    /// contents replace the inline `middleware` list at load time.
    pub middleware_config_path: Option<PathBuf>,

    /// Ordered middleware pipeline, applied to every route.
    pub middleware: Vec<MiddlewareSpec>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: ":8080".to_string(),
            buffer_size: 200,
            max_concurrency: default_concurrency(),
            request_timeout: 3_000,
            quit_timeout: 5_000,
            middleware_config_path: None,
            middleware: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ObservabilityConfig {
    /// Serve Prometheus metrics when enabled.
    pub metrics_enabled: bool,

    /// Bind address for the metrics exporter.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Default request concurrency: one slot per available core.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Expand the listener shorthand ":8080" into a bindable address.
///
/// Addresses that already carry a host are returned unchanged.
pub fn normalize_address(address: &str) -> String {
    match address.strip_prefix(':') {
        Some(port) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            format!("0.0.0.0:{}", port)
        }
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.address, ":8080");
        assert_eq!(config.buffer_size, 200);
        assert_eq!(config.request_timeout, 3_000);
        assert_eq!(config.quit_timeout, 5_000);
        assert_eq!(config.max_concurrency, default_concurrency());
        assert!(config.middleware_config_path.is_none());
        assert!(config.middleware.is_empty());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn default_concurrency_is_positive() {
        assert!(default_concurrency() >= 1);
    }

    #[test]
    fn normalize_expands_port_shorthand() {
        assert_eq!(normalize_address(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_address(":80"), "0.0.0.0:80");
    }

    #[test]
    fn normalize_keeps_full_addresses() {
        assert_eq!(normalize_address("127.0.0.1:8080"), "127.0.0.1:8080");
        assert_eq!(normalize_address("0.0.0.0:9000"), "0.0.0.0:9000");
        assert_eq!(normalize_address("[::1]:8080"), "[::1]:8080");
    }

    #[test]
    fn normalize_leaves_malformed_input_alone() {
        assert_eq!(normalize_address(":"), ":");
        assert_eq!(normalize_address(":abc"), ":abc");
        assert_eq!(normalize_address(""), "");
    }
}
