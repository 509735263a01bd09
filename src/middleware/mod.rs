//! Built-in middleware and the declarative pipeline builder.
//!
//! # Data Flow
//! ```text
//! config [[middleware]] entries
//!     → MiddlewareSpec (serde, tagged by `kind`)
//!     → build() resolves each spec to an interceptor
//!     → Service installs them between bootstrap and route handlers
//! ```
//!
//! # Design Decisions
//! - Pipeline order is config order; nothing here reorders
//! - Bad middleware config fails service construction, never a request
//! - Custom kinds resolve through a registry supplied by the embedder
//! - Building is deterministic: same specs and registry, same pipeline

pub mod access_log;
pub mod headers;
pub mod request_id;

pub use access_log::AccessLog;
pub use headers::ResponseHeaders;
pub use request_id::RequestId;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handler::Interceptor;

/// One pipeline entry as written in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MiddlewareSpec {
    /// Log one line per finished request.
    AccessLog,
    /// Tag requests with a correlation id.
    RequestId {
        #[serde(default = "default_request_id_header")]
        header: String,
    },
    /// Stamp fixed headers on every response.
    ResponseHeaders { headers: BTreeMap<String, String> },
    /// Embedder-registered middleware, configured by an opaque table.
    Custom {
        name: String,
        #[serde(default = "empty_config")]
        config: toml::Value,
    },
}

fn default_request_id_header() -> String {
    request_id::DEFAULT_HEADER.to_string()
}

fn empty_config() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

/// Why a pipeline could not be built.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("unknown custom middleware {0:?}")]
    UnknownCustom(String),
    #[error("invalid header name or value for {name:?}")]
    InvalidHeader { name: String },
    #[error("custom middleware {name:?} rejected its config: {reason}")]
    Rejected { name: String, reason: String },
}

/// Constructor for a custom middleware kind.
pub type CustomMiddleware =
    Arc<dyn Fn(&toml::Value) -> Result<Arc<dyn Interceptor>, MiddlewareError> + Send + Sync>;

/// Custom middleware constructors, keyed by the `name` a spec uses.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    constructors: HashMap<String, CustomMiddleware>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor. A later registration under the same name
    /// replaces the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&toml::Value) -> Result<Arc<dyn Interceptor>, MiddlewareError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    fn get(&self, name: &str) -> Option<&CustomMiddleware> {
        self.constructors.get(name)
    }
}

/// Resolve specs into interceptors, preserving config order.
///
/// Any failing entry aborts the whole build; a service never starts
/// with a partial pipeline.
pub fn build(
    specs: &[MiddlewareSpec],
    registry: &MiddlewareRegistry,
) -> Result<Vec<Arc<dyn Interceptor>>, MiddlewareError> {
    let mut pipeline = Vec::with_capacity(specs.len());
    for spec in specs {
        let interceptor: Arc<dyn Interceptor> = match spec {
            MiddlewareSpec::AccessLog => Arc::new(AccessLog),
            MiddlewareSpec::RequestId { header } => Arc::new(RequestId::new(header)?),
            MiddlewareSpec::ResponseHeaders { headers } => {
                Arc::new(ResponseHeaders::new(headers)?)
            }
            MiddlewareSpec::Custom { name, config } => {
                let constructor = registry
                    .get(name)
                    .ok_or_else(|| MiddlewareError::UnknownCustom(name.clone()))?;
                constructor(config)?
            }
        };
        pipeline.push(interceptor);
    }
    Ok(pipeline)
}
