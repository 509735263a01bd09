//! Image Service Front Library
//!
//! Lifecycle, admission control and handler-chain composition for the
//! image HTTP service. The binary in `main.rs` wires a [`Service`] up
//! from configuration; embedders can do the same through
//! [`service::ServiceBuilder`].

pub mod config;
pub mod context;
pub mod engine;
pub mod handler;
pub mod image;
pub mod middleware;
pub mod observability;
pub mod router;
pub mod service;

pub use config::schema::ServiceConfig;
pub use context::RequestContext;
pub use handler::{handler_fn, HandlerFn};
pub use router::Routes;
pub use service::{Service, SubService};
