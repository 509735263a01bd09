//! Service lifecycle.
//!
//! # Responsibilities
//! - Own configuration, handler factory, routes and engine
//! - Drive Created → Opening → Open → Quitting → Closed
//! - Compose handler chains exactly once, at open
//! - Bounded graceful quit: drain in-flight work, then force close
//!
//! # Design Decisions
//! - `open()` serves in the caller's task and returns when serving ends
//! - Construction is where bad config dies: semantic validation and a
//!   middleware dry build both run in the builder
//! - `quit()` marks the service closed even when the grace period is
//!   overrun; Closed is terminal either way
//! - A failed bind reverts to Created with registrations intact, so the
//!   caller may retry open

pub mod shutdown;
pub mod state;

pub use state::Lifecycle;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::Method;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::{validate_config, ConfigError, ServiceConfig};
use crate::engine::{EngineError, HttpEngine, ServerEngine};
use crate::handler::{HandlerChain, HandlerFactory, HandlerFn, Interceptor};
use crate::middleware::{self, MiddlewareError, MiddlewareRegistry};
use crate::router::Routes;
use crate::service::shutdown::Shutdown;

/// A route group that registers itself on the service during open.
pub trait SubService: Send {
    /// Called exactly once, after open() is accepted and before the
    /// engine binds.
    fn register_all(&self, routes: &mut Routes);
}

/// Errors from service construction and lifecycle operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("middleware pipeline rejected: {0}")]
    Middleware(#[from] MiddlewareError),
    #[error("{op} not allowed while service is {state}")]
    State { op: &'static str, state: Lifecycle },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("quit timed out after {0:?}, remaining requests abandoned")]
    QuitTimeout(Duration),
}

type EngineFactory = Box<dyn Fn() -> Box<dyn ServerEngine> + Send + Sync>;

/// Configures and constructs a [`Service`].
pub struct ServiceBuilder {
    config: ServiceConfig,
    registry: MiddlewareRegistry,
    subservices: Vec<Box<dyn SubService>>,
    engine_factory: Option<EngineFactory>,
}

impl ServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            registry: MiddlewareRegistry::new(),
            subservices: Vec::new(),
            engine_factory: None,
        }
    }

    /// Make a custom middleware kind available to the pipeline.
    pub fn custom_middleware<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&toml::Value) -> Result<Arc<dyn Interceptor>, MiddlewareError>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, constructor);
        self
    }

    /// Queue a sub-service for registration at open.
    pub fn subservice(mut self, sub: impl SubService + 'static) -> Self {
        self.subservices.push(Box::new(sub));
        self
    }

    /// Swap the server engine. The factory runs once per open attempt;
    /// the default builds an [`HttpEngine`].
    pub fn engine<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ServerEngine> + Send + Sync + 'static,
    {
        self.engine_factory = Some(Box::new(factory));
        self
    }

    /// Validate and construct. Bad configuration and a middleware
    /// pipeline that cannot build both fail here, never at request time.
    pub fn build(self) -> Result<Service, ServiceError> {
        validate_config(&self.config).map_err(ConfigError::Validation)?;
        // Dry build. open() rebuilds the same pipeline; the builder
        // contract is deterministic, so what passes here passes there.
        let _ = middleware::build(&self.config.middleware, &self.registry)?;

        let factory = HandlerFactory::new(&self.config);
        let engine_factory = self
            .engine_factory
            .unwrap_or_else(|| Box::new(|| Box::new(HttpEngine::new())));
        let (addr_tx, addr_rx) = watch::channel(None);

        Ok(Service {
            config: self.config,
            factory,
            registry: self.registry,
            state: Mutex::new(Lifecycle::Created),
            routes: Mutex::new(Routes::new()),
            subservices: Mutex::new(self.subservices),
            engine_factory,
            graceful: Shutdown::new(),
            force: Shutdown::new(),
            addr_tx: Mutex::new(Some(addr_tx)),
            addr_rx: Mutex::new(addr_rx),
        })
    }
}

/// The HTTP front of the image service.
///
/// Construct with [`Service::new`] or [`Service::builder`], register
/// routes and sub-services, then [`Service::open`]. One instance serves
/// at most once; after [`Service::quit`] it stays closed.
pub struct Service {
    config: ServiceConfig,
    factory: HandlerFactory,
    registry: MiddlewareRegistry,
    state: Mutex<Lifecycle>,
    routes: Mutex<Routes>,
    subservices: Mutex<Vec<Box<dyn SubService>>>,
    engine_factory: EngineFactory,
    graceful: Shutdown,
    force: Shutdown,
    // The sender travels into the engine for the duration of an open
    // attempt; serve() installs a fresh pair when the attempt ends.
    addr_tx: Mutex<Option<watch::Sender<Option<SocketAddr>>>>,
    addr_rx: Mutex<watch::Receiver<Option<SocketAddr>>>,
}

impl Service {
    /// Service with the default engine and no custom middleware.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ServiceConfig) -> ServiceBuilder {
        ServiceBuilder::new(config)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> Lifecycle {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// Bound address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.addr_rx.lock().expect("address mutex poisoned").borrow()
    }

    /// Resolve with the bound address once the service reaches Open.
    ///
    /// Callable before or during open; resolves with `None` when the
    /// open attempt ends without reaching Open, or when the service is
    /// already closed.
    pub async fn wait_ready(&self) -> Option<SocketAddr> {
        if self.state() == Lifecycle::Closed {
            return None;
        }
        let mut rx = self.addr_rx.lock().expect("address mutex poisoned").clone();
        loop {
            if let Some(addr) = *rx.borrow_and_update() {
                return Some(addr);
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }

    /// Register handlers for a verb and path. Registrations are only
    /// accepted before open; later ones are ignored with a warning.
    pub fn register(&self, method: Method, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        let path = path.into();
        if self.state() != Lifecycle::Created {
            tracing::warn!(method = %method, path = %path, "Route registration after open is ignored");
            return;
        }
        let mut routes = self.routes.lock().expect("routes mutex poisoned");
        routes.register(method, path, handlers);
    }

    pub fn get(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::GET, path, handlers);
    }

    pub fn post(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::POST, path, handlers);
    }

    pub fn put(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::PUT, path, handlers);
    }

    pub fn delete(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::DELETE, path, handlers);
    }

    pub fn head(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::HEAD, path, handlers);
    }

    pub fn options(&self, path: impl Into<String>, handlers: Vec<HandlerFn>) {
        self.register(Method::OPTIONS, path, handlers);
    }

    /// Add a sub-service after construction but before open.
    pub fn add_subservice(&self, sub: impl SubService + 'static) {
        if self.state() != Lifecycle::Created {
            tracing::warn!("Sub-service added after open is ignored");
            return;
        }
        self.subservices
            .lock()
            .expect("subservices mutex poisoned")
            .push(Box::new(sub));
    }

    /// Open the service and serve until quit.
    ///
    /// Sub-services register, each route is composed behind the
    /// bootstrap interceptor and middleware pipeline, the engine binds,
    /// and the call then blocks for the serving lifetime. A bind
    /// failure reverts the service to Created.
    pub async fn open(&self) -> Result<(), ServiceError> {
        self.transition(Lifecycle::Created, Lifecycle::Opening, "open")?;
        match self.serve().await {
            Ok(()) => {
                // Serving can end before ever reaching Open when quit
                // raced the bind; leave any state quit() decided on.
                self.advance_if(Lifecycle::Opening, Lifecycle::Created);
                Ok(())
            }
            Err(e) => {
                self.reset_after_failure();
                Err(e)
            }
        }
    }

    /// Gracefully stop serving, bounded by quit-timeout.
    ///
    /// The accept loop stops at once; committed requests get the grace
    /// period to finish. On overrun the remaining connections are
    /// abandoned and [`ServiceError::QuitTimeout`] is returned. The
    /// service counts as closed in both cases. A concurrent quit joins
    /// the drain already in progress.
    pub async fn quit(&self) -> Result<(), ServiceError> {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            match *state {
                Lifecycle::Open => *state = Lifecycle::Quitting,
                Lifecycle::Quitting => {}
                other => {
                    return Err(ServiceError::State { op: "quit", state: other });
                }
            }
        }

        let gate = self.factory.gate();
        tracing::info!(in_flight = gate.in_flight(), "Service quitting");
        self.graceful.trigger();

        let grace = Duration::from_millis(self.config.quit_timeout);
        let drained = tokio::time::timeout(grace, gate.drained()).await;
        self.set_state(Lifecycle::Closed);

        match drained {
            Ok(()) => {
                tracing::info!("Service closed");
                Ok(())
            }
            Err(_) => {
                let abandoned = gate.in_flight();
                self.force.trigger();
                tracing::warn!(abandoned = abandoned, "Grace period elapsed, forcing close");
                Err(ServiceError::QuitTimeout(grace))
            }
        }
    }

    async fn serve(&self) -> Result<(), ServiceError> {
        let pipeline = middleware::build(&self.config.middleware, &self.registry)?;

        let subservices = {
            let mut guard = self.subservices.lock().expect("subservices mutex poisoned");
            std::mem::take(&mut *guard)
        };
        if !subservices.is_empty() {
            let mut routes = self.routes.lock().expect("routes mutex poisoned");
            for sub in &subservices {
                sub.register_all(&mut routes);
            }
        }

        let registrations: Vec<(Method, String, Vec<HandlerFn>)> = {
            let routes = self.routes.lock().expect("routes mutex poisoned");
            routes
                .pending()
                .iter()
                .map(|r| (r.method.clone(), r.path.clone(), r.handlers.clone()))
                .collect()
        };
        let route_count = registrations.len();

        let mut shared: Vec<Arc<dyn Interceptor>> = Vec::with_capacity(pipeline.len() + 1);
        shared.push(self.factory.create());
        shared.extend(pipeline);

        let mut engine = (self.engine_factory)();
        for (method, path, handlers) in registrations {
            let mut elements = shared.clone();
            elements.extend(self.factory.build_many(handlers));
            engine.register_chain(method, &path, HandlerChain::new(elements));
        }

        tracing::info!(
            address = %self.config.address,
            routes = route_count,
            middleware = shared.len() - 1,
            max_concurrency = self.config.max_concurrency,
            buffer_size = self.config.buffer_size,
            "Service opening"
        );

        // The engine reports its bound address on a private channel so
        // the state flips to Open before wait_ready() can observe it.
        let public_tx = self
            .addr_tx
            .lock()
            .expect("address mutex poisoned")
            .take()
            .expect("ready sender missing outside serve");
        let (engine_tx, mut engine_rx) = watch::channel(None);

        let graceful = self.graceful.subscribe();
        let force = self.force.subscribe();
        let mut serving = engine.listen(self.config.address.clone(), engine_tx, graceful, force);

        let early_result = tokio::select! {
            result = &mut serving => Some(result),
            _ = engine_rx.changed() => None,
        };
        let result = match early_result {
            Some(result) => result,
            None => {
                let bound = *engine_rx.borrow();
                if let Some(addr) = bound {
                    self.advance_if(Lifecycle::Opening, Lifecycle::Open);
                    let _ = public_tx.send(Some(addr));
                    tracing::info!(address = %addr, "Service open");
                }
                serving.await
            }
        };

        // Fresh pair for any later attempt. Waiters on the old channel
        // observe the sender drop and read its final value.
        let (next_tx, next_rx) = watch::channel(None);
        *self.addr_rx.lock().expect("address mutex poisoned") = next_rx;
        *self.addr_tx.lock().expect("address mutex poisoned") = Some(next_tx);

        result.map_err(ServiceError::Engine)
    }

    fn transition(
        &self,
        from: Lifecycle,
        to: Lifecycle,
        op: &'static str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if *state != from {
            return Err(ServiceError::State { op, state: *state });
        }
        *state = to;
        Ok(())
    }

    fn advance_if(&self, from: Lifecycle, to: Lifecycle) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if *state == from {
            *state = to;
        }
    }

    fn set_state(&self, to: Lifecycle) {
        *self.state.lock().expect("state mutex poisoned") = to;
    }

    fn reset_after_failure(&self) {
        let mut state = self.state.lock().expect("state mutex poisoned");
        if !state.is_terminal() {
            *state = Lifecycle::Created;
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::interceptor_fn;
    use crate::middleware::MiddlewareSpec;

    fn custom_spec(name: &str) -> MiddlewareSpec {
        MiddlewareSpec::Custom {
            name: name.to_string(),
            config: toml::Value::Table(toml::map::Map::new()),
        }
    }

    #[test]
    fn construction_validates_config() {
        let config = ServiceConfig {
            max_concurrency: 0,
            ..ServiceConfig::default()
        };
        let err = Service::new(config).unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn construction_validates_middleware() {
        let config = ServiceConfig {
            middleware: vec![custom_spec("missing")],
            ..ServiceConfig::default()
        };
        let err = Service::new(config).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Middleware(MiddlewareError::UnknownCustom(_))
        ));
    }

    #[test]
    fn registered_custom_middleware_passes_construction() {
        let config = ServiceConfig {
            middleware: vec![custom_spec("noop")],
            ..ServiceConfig::default()
        };
        let service = Service::builder(config)
            .custom_middleware("noop", |_config: &toml::Value| {
                Ok(interceptor_fn(|ctx, next| {
                    Box::pin(async move { next.run(ctx).await })
                }))
            })
            .build();
        assert!(service.is_ok());
    }

    #[test]
    fn new_service_starts_created() {
        let service = Service::new(ServiceConfig::default()).unwrap();
        assert_eq!(service.state(), Lifecycle::Created);
        assert_eq!(service.local_addr(), None);
    }

    #[tokio::test]
    async fn quit_requires_open() {
        let service = Service::new(ServiceConfig::default()).unwrap();
        let err = service.quit().await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::State {
                op: "quit",
                state: Lifecycle::Created
            }
        ));
    }
}
