//! Access logging middleware.

use std::sync::Arc;
use std::time::Instant;

use crate::context::RequestContext;
use crate::handler::chain::{BoxFuture, Interceptor, Next};
use crate::observability::metrics;

/// Logs one structured line per finished request and feeds the request
/// counters. Sits anywhere in the pipeline; whatever runs downstream of
/// it is what gets timed.
pub struct AccessLog;

impl Interceptor for AccessLog {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.method().clone();
            let path = ctx.path().to_string();

            next.run(ctx.clone()).await;

            let status = ctx.status();
            let elapsed = start.elapsed();
            metrics::record_request(status.as_u16(), elapsed);
            tracing::info!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                latency_ms = elapsed.as_millis() as u64,
                "Request completed"
            );
        })
    }
}
