//! Verb-indexed route registration facade.
//!
//! Registrations accumulate here until the service opens; only then are
//! they composed with the bootstrap and middleware pipeline and handed
//! to the engine. Nothing is served before open.

use http::Method;

use crate::handler::HandlerFn;

/// One pending registration: a verb, a path pattern and the ordered
/// handler sequence to run after the shared pipeline.
pub(crate) struct RouteRegistration {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) handlers: Vec<HandlerFn>,
}

/// Accumulates route registrations for a service.
///
/// Duplicate (method, path) pairs are passed through untouched; how
/// they collide is the engine's policy. A route with zero handlers is
/// legal and yields the empty 200 default.
#[derive(Default)]
pub struct Routes {
    pending: Vec<RouteRegistration>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handlers` for `method` on `path`.
    pub fn register(
        &mut self,
        method: Method,
        path: impl Into<String>,
        handlers: Vec<HandlerFn>,
    ) {
        self.pending.push(RouteRegistration {
            method,
            path: path.into(),
            handlers,
        });
    }

    pub fn get(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::GET, path, handlers);
    }

    pub fn post(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::POST, path, handlers);
    }

    pub fn put(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::PUT, path, handlers);
    }

    pub fn delete(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::DELETE, path, handlers);
    }

    pub fn head(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::HEAD, path, handlers);
    }

    pub fn options(&mut self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::OPTIONS, path, handlers);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending registrations, in registration order. Registrations are
    /// kept so a failed open can be retried wholesale.
    pub(crate) fn pending(&self) -> &[RouteRegistration] {
        &self.pending
    }
}
