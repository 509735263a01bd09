//! Static response header middleware.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::{HeaderName, HeaderValue};

use crate::context::RequestContext;
use crate::handler::chain::{BoxFuture, Interceptor, Next};
use crate::middleware::MiddlewareError;

/// Stamps a fixed header set on every response.
///
/// Headers are applied before the rest of the chain runs, so handlers
/// can still override individual values. Names and values are parsed at
/// construction; a bad entry fails the pipeline build.
#[derive(Debug)]
pub struct ResponseHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHeaders {
    pub fn new(headers: &BTreeMap<String, String>) -> Result<Self, MiddlewareError> {
        let mut parsed = Vec::with_capacity(headers.len());
        for (name, value) in headers {
            let header_name =
                name.parse::<HeaderName>()
                    .map_err(|_| MiddlewareError::InvalidHeader {
                        name: name.clone(),
                    })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|_| MiddlewareError::InvalidHeader {
                    name: name.clone(),
                })?;
            parsed.push((header_name, header_value));
        }
        Ok(Self { headers: parsed })
    }
}

impl Interceptor for ResponseHeaders {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                ctx.set_header(name.clone(), value.clone());
            }
            next.run(ctx).await;
        })
    }
}
