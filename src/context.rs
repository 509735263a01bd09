//! Per-request context shared across a handler chain.
//!
//! # Responsibilities
//! - Carry the parsed request (method, path, headers, body)
//! - Accumulate the response as chain elements run
//! - Hold the advisory deadline armed by the bootstrap interceptor
//! - Provide the abort flag that short-circuits chain traversal
//! - Offer a key/value scratch area for cross-element state
//!
//! # Design Decisions
//! - The context is shared as `Arc<RequestContext>`; mutable pieces sit
//!   behind interior mutability so chain elements never contend over
//!   `&mut` access across await points
//! - The deadline is advisory: nothing here cancels a handler, elements
//!   consult `deadline_exceeded` and bail out on their own
//! - One context exists per request and dies with the chain run

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// Response under construction. Starts as an empty 200 and is filled in
/// by whichever chain elements choose to write.
#[derive(Debug, Default)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// State carried through one request's handler chain.
pub struct RequestContext {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    deadline: OnceLock<Instant>,
    aborted: AtomicBool,
    values: Mutex<HashMap<String, serde_json::Value>>,
    response: Mutex<ResponseParts>,
}

impl RequestContext {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            query,
            headers,
            body,
            deadline: OnceLock::new(),
            aborted: AtomicBool::new(false),
            values: Mutex::new(HashMap::new()),
            response: Mutex::new(ResponseParts::default()),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request header value as UTF-8, if present and decodable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Arm the advisory deadline. Only the first call takes effect.
    pub(crate) fn arm_deadline(&self, deadline: Instant) {
        let _ = self.deadline.set(deadline);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Time left before the advisory deadline, zero once it has passed.
    /// `None` when no deadline was armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline().is_some_and(|d| Instant::now() >= d)
    }

    /// Stop chain traversal after the current element returns.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Abort with a response status, the usual shape for rejections.
    pub fn abort_with_status(&self, status: StatusCode) {
        self.set_status(status);
        self.abort();
    }

    /// Store a cross-element value under `key`, replacing any previous one.
    pub fn set_value(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut values = self.values.lock().expect("context values mutex poisoned");
        values.insert(key.into(), value);
    }

    pub fn value(&self, key: &str) -> Option<serde_json::Value> {
        let values = self.values.lock().expect("context values mutex poisoned");
        values.get(key).cloned()
    }

    pub fn status(&self) -> StatusCode {
        self.response().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response_mut(|r| r.status = status);
    }

    /// Set a response header, replacing any previous value.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.response_mut(|r| {
            r.headers.insert(name, value);
        });
    }

    /// Write status and body in one step.
    pub fn respond(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.response_mut(|r| {
            r.status = status;
            r.body = body.into();
        });
    }

    pub fn set_body(&self, body: impl Into<Bytes>) {
        self.response_mut(|r| r.body = body.into());
    }

    /// Take the accumulated response, leaving an empty 200 behind.
    pub fn take_response(&self) -> ResponseParts {
        let mut response = self.response.lock().expect("context response mutex poisoned");
        std::mem::take(&mut *response)
    }

    fn response(&self) -> std::sync::MutexGuard<'_, ResponseParts> {
        self.response.lock().expect("context response mutex poisoned")
    }

    fn response_mut<T>(&self, f: impl FnOnce(&mut ResponseParts) -> T) -> T {
        let mut response = self.response.lock().expect("context response mutex poisoned");
        f(&mut response)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_context(method: Method, path: &str) -> std::sync::Arc<RequestContext> {
    std::sync::Arc::new(RequestContext::new(
        method,
        path,
        None,
        HeaderMap::new(),
        Bytes::new(),
    ))
}
