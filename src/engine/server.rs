//! Default HTTP engine.
//!
//! Dispatches through an axum router but drives connections by hand:
//! an accept loop spawns one task per connection into a `JoinSet`, so
//! graceful shutdown can drain exactly the connections that exist and
//! force-close can abort them for real. `axum::serve` detaches its
//! connection tasks, which would leave abandoned requests running after
//! a forced close.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use axum::routing::MethodFilter;
use http::{Method, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::config::schema::normalize_address;
use crate::context::RequestContext;
use crate::engine::{EngineError, ListenFuture, ServerEngine};
use crate::handler::HandlerChain;
use crate::service::shutdown::ShutdownSignal;

/// Request bodies above this are answered with 413 before any chain runs.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Engine speaking HTTP/1.1 and HTTP/2 over plain TCP.
pub struct HttpEngine {
    router: axum::Router,
}

impl HttpEngine {
    pub fn new() -> Self {
        Self {
            router: axum::Router::new(),
        }
    }
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerEngine for HttpEngine {
    /// Registering the same verb and path twice panics at open, which
    /// is the axum router's collision policy.
    fn register_chain(&mut self, method: Method, path: &str, chain: HandlerChain) {
        let Ok(filter) = MethodFilter::try_from(method.clone()) else {
            tracing::error!(method = %method, path = path, "Unsupported method, route skipped");
            return;
        };
        let handler = move |request: Request| {
            let chain = chain.clone();
            async move { run_chain(chain, request).await }
        };
        let router = std::mem::take(&mut self.router);
        self.router = router.route(path, axum::routing::on(filter, handler));
    }

    fn listen(
        self: Box<Self>,
        address: String,
        ready: watch::Sender<Option<SocketAddr>>,
        graceful: ShutdownSignal,
        force: ShutdownSignal,
    ) -> ListenFuture {
        let router = self.router;
        Box::pin(async move {
            let address = normalize_address(&address);
            let listener = TcpListener::bind(&address)
                .await
                .map_err(|source| EngineError::Bind {
                    addr: address.clone(),
                    source,
                })?;
            let local_addr = listener.local_addr().map_err(EngineError::Serve)?;
            let _ = ready.send(Some(local_addr));
            tracing::info!(address = %local_addr, "Engine listening");

            let mut connections = JoinSet::new();
            let stop_accepting = graceful.clone().wait();
            tokio::pin!(stop_accepting);

            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                serve_connection(
                                    &mut connections,
                                    stream,
                                    peer,
                                    router.clone(),
                                    graceful.clone(),
                                );
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Accept failed");
                            }
                        }
                    }
                    Some(_) = connections.join_next() => {}
                    () = &mut stop_accepting => break,
                }
            }
            // The socket closes here; nothing new is accepted while we drain.
            drop(listener);
            tracing::debug!(connections = connections.len(), "Draining connections");

            tokio::select! {
                () = drain(&mut connections) => {}
                () = force.wait() => {
                    tracing::warn!(
                        abandoned = connections.len(),
                        "Force close, abandoning open connections"
                    );
                    connections.abort_all();
                    drain(&mut connections).await;
                }
            }
            tracing::info!("Engine stopped");
            Ok(())
        })
    }
}

async fn drain(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

fn serve_connection(
    connections: &mut JoinSet<()>,
    stream: TcpStream,
    peer: SocketAddr,
    router: axum::Router,
    graceful: ShutdownSignal,
) {
    connections.spawn(async move {
        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(router);
        let builder = auto::Builder::new(TokioExecutor::new());
        let connection = builder.serve_connection(io, service);
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(peer = %peer, error = %e, "Connection ended with error");
                }
            }
            () = graceful.wait() => {
                // Finish the in-flight exchange, then close.
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.as_mut().await {
                    tracing::debug!(peer = %peer, error = %e, "Connection ended during drain");
                }
            }
        }
    });
}

/// Bridge one wire request onto a handler chain.
async fn run_chain(chain: HandlerChain, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let mut response = Response::new(Body::from("request body too large"));
            *response.status_mut() = StatusCode::PAYLOAD_TOO_LARGE;
            return response;
        }
    };

    let ctx = Arc::new(RequestContext::new(
        parts.method,
        parts.uri.path().to_string(),
        parts.uri.query().map(str::to_string),
        parts.headers,
        body,
    ));
    chain.run(ctx.clone()).await;

    let assembled = ctx.take_response();
    let mut response = Response::new(Body::from(assembled.body));
    *response.status_mut() = assembled.status;
    *response.headers_mut() = assembled.headers;
    response
}
