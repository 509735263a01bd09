//! Shared utilities for the integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::task::JoinHandle;

use imgd::service::ServiceError;
use imgd::{handler_fn, HandlerFn, Service, ServiceConfig};

/// Config bound to an ephemeral loopback port.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        address: "127.0.0.1:0".to_string(),
        ..ServiceConfig::default()
    }
}

/// Spawn `open()` and wait until the service reports its bound address.
pub async fn open_service(
    service: &Arc<Service>,
) -> (SocketAddr, JoinHandle<Result<(), ServiceError>>) {
    let task = tokio::spawn({
        let service = Arc::clone(service);
        async move { service.open().await }
    });
    let addr = service
        .wait_ready()
        .await
        .expect("Service did not reach open");
    (addr, task)
}

/// Handler that responds 200 with `body` immediately.
#[allow(dead_code)]
pub fn ok_handler(body: &'static str) -> HandlerFn {
    handler_fn(move |ctx| {
        Box::pin(async move {
            ctx.respond(StatusCode::OK, body);
        })
    })
}

/// Handler that responds 200 with `body` after sleeping.
#[allow(dead_code)]
pub fn sleeping_handler(delay: Duration, body: &'static str) -> HandlerFn {
    handler_fn(move |ctx| {
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            ctx.respond(StatusCode::OK, body);
        })
    })
}

/// HTTP client that ignores any ambient proxy configuration.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
