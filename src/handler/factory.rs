//! Handler factory.
//!
//! Adapts route handlers into chain elements and manufactures the
//! bootstrap interceptor that fronts every chain: admission first, then
//! the advisory deadline, then the rest of the pipeline. The admission
//! permit is held until the chain run completes, so the concurrency
//! ceiling counts whole requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::config::ServiceConfig;
use crate::context::RequestContext;
use crate::handler::admission::{Admission, AdmissionGate};
use crate::handler::chain::{BoxFuture, Interceptor, Next};
use crate::observability::metrics;

/// A route handler: one async step over the shared request context.
pub type HandlerFn = Arc<dyn Fn(Arc<RequestContext>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<RequestContext>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Builds chain elements for one service instance.
///
/// All chains built by the same factory share one [`AdmissionGate`], so
/// the ceiling applies service-wide rather than per route.
pub struct HandlerFactory {
    gate: Arc<AdmissionGate>,
    request_timeout: Duration,
}

impl HandlerFactory {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            gate: Arc::new(AdmissionGate::new(
                config.max_concurrency,
                config.buffer_size,
            )),
            request_timeout: Duration::from_millis(config.request_timeout),
        }
    }

    /// Gate shared by every chain this factory builds.
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Adapt one route handler into a chain element.
    pub fn build(&self, handler: HandlerFn) -> Arc<dyn Interceptor> {
        Arc::new(RouteHandler { inner: handler })
    }

    /// Adapt a handler sequence, preserving order. Empty input yields
    /// an empty element list.
    pub fn build_many(&self, handlers: Vec<HandlerFn>) -> Vec<Arc<dyn Interceptor>> {
        handlers.into_iter().map(|h| self.build(h)).collect()
    }

    /// Manufacture the bootstrap interceptor that fronts every chain.
    pub fn create(&self) -> Arc<dyn Interceptor> {
        Arc::new(Bootstrap {
            gate: self.gate.clone(),
            request_timeout: self.request_timeout,
        })
    }
}

/// Terminal-style chain element wrapping a route handler. Runs the
/// handler, then lets the rest of the chain proceed unless the handler
/// aborted the context.
struct RouteHandler {
    inner: HandlerFn,
}

impl Interceptor for RouteHandler {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            (self.inner)(ctx.clone()).await;
            next.run(ctx).await;
        })
    }
}

/// First element of every chain: admission, then the advisory deadline.
struct Bootstrap {
    gate: Arc<AdmissionGate>,
    request_timeout: Duration,
}

impl Interceptor for Bootstrap {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let permit = match self.gate.admit().await {
                Admission::Admitted(permit) => permit,
                Admission::Rejected => {
                    metrics::record_admission_rejected();
                    tracing::warn!(
                        method = %ctx.method(),
                        path = ctx.path(),
                        "Request rejected, service at capacity"
                    );
                    ctx.respond(StatusCode::SERVICE_UNAVAILABLE, "service at capacity");
                    ctx.abort();
                    return;
                }
            };

            if !self.request_timeout.is_zero() {
                ctx.arm_deadline(Instant::now() + self.request_timeout);
            }

            next.run(ctx).await;
            // Slot spans the whole chain run.
            drop(permit);
        })
    }
}
