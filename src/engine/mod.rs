//! Server engine abstraction.
//!
//! The service composes handler chains; an engine owns the socket and
//! maps wire requests onto those chains. Keeping the seam here lets
//! tests substitute an engine and keeps the lifecycle logic free of
//! HTTP details.

pub mod server;

pub use server::HttpEngine;

use std::net::SocketAddr;

use http::Method;
use thiserror::Error;
use tokio::sync::watch;

use crate::handler::{BoxFuture, HandlerChain};
use crate::service::shutdown::ShutdownSignal;

/// Why an engine run ended early.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Future returned by [`ServerEngine::listen`].
pub type ListenFuture = BoxFuture<'static, Result<(), EngineError>>;

/// Where composed chains get served from.
///
/// `listen` consumes the engine, so one engine instance binds at most
/// once; the service constructs a fresh engine per open attempt.
pub trait ServerEngine: Send + 'static {
    /// Install a chain for a verb and path pattern. Collisions follow
    /// the engine's own policy.
    fn register_chain(&mut self, method: Method, path: &str, chain: HandlerChain);

    /// Bind `address` and serve until told to stop.
    ///
    /// The bound address is published through `ready` once the engine
    /// accepts connections. `graceful` stops the accept loop and drains
    /// open connections; `force` abandons whatever is still open.
    fn listen(
        self: Box<Self>,
        address: String,
        ready: watch::Sender<Option<SocketAddr>>,
        graceful: ShutdownSignal,
        force: ShutdownSignal,
    ) -> ListenFuture;
}
