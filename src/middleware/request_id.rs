//! Request ID middleware.

use std::sync::Arc;

use http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::handler::chain::{BoxFuture, Interceptor, Next};
use crate::middleware::MiddlewareError;

/// Header carrying the correlation id, unless configured otherwise.
pub const DEFAULT_HEADER: &str = "x-request-id";

/// Context value key under which the id is stored.
pub const REQUEST_ID_KEY: &str = "request-id";

/// Tags every request with a correlation id.
///
/// An id arriving on the configured request header is reused, otherwise
/// a fresh UUID v4 is generated. The id is stored in the context value
/// map and echoed on the response.
pub struct RequestId {
    header: HeaderName,
}

impl RequestId {
    pub fn new(header: &str) -> Result<Self, MiddlewareError> {
        let header = header
            .parse::<HeaderName>()
            .map_err(|_| MiddlewareError::InvalidHeader {
                name: header.to_string(),
            })?;
        Ok(Self { header })
    }
}

impl Interceptor for RequestId {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = ctx
                .header(self.header.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            ctx.set_value(REQUEST_ID_KEY, serde_json::Value::String(id.clone()));
            if let Ok(value) = HeaderValue::from_str(&id) {
                ctx.set_header(self.header.clone(), value);
            }

            next.run(ctx).await;
        })
    }
}
