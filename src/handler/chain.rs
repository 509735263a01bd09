//! Ordered interceptor chains.
//!
//! A chain is an immutable sequence of interceptors sharing one
//! [`RequestContext`]. Each element decides whether the rest of the
//! chain runs by calling [`Next::run`]; traversal also stops on its own
//! whenever the context has been aborted.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RequestContext;

/// Boxed future used throughout the chain machinery.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One element of a handler chain.
///
/// Implementations run their own logic and delegate to `next` for the
/// remainder of the chain. Skipping the `next.run(ctx)` call (or
/// aborting the context first) short-circuits everything downstream.
pub trait Interceptor: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()>;
}

impl std::fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<interceptor>")
    }
}

/// Continuation over the remaining chain elements.
pub struct Next {
    elements: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
}

impl Next {
    /// Run the rest of the chain. Returns immediately when the context
    /// is aborted or no elements remain.
    pub fn run(self, ctx: Arc<RequestContext>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if ctx.is_aborted() {
                return;
            }
            let Some(element) = self.elements.get(self.index).cloned() else {
                return;
            };
            let next = Next {
                elements: self.elements,
                index: self.index + 1,
            };
            element.handle(ctx, next).await;
        })
    }
}

/// An immutable, cheaply cloneable interceptor sequence.
#[derive(Clone)]
pub struct HandlerChain {
    elements: Arc<[Arc<dyn Interceptor>]>,
}

impl HandlerChain {
    pub fn new(elements: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            elements: elements.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Traverse the chain from the first element.
    pub async fn run(&self, ctx: Arc<RequestContext>) {
        Next {
            elements: self.elements.clone(),
            index: 0,
        }
        .run(ctx)
        .await;
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerChain")
            .field("len", &self.len())
            .finish()
    }
}

/// Wrap a closure as an [`Interceptor`].
pub fn interceptor_fn<F>(f: F) -> Arc<dyn Interceptor>
where
    F: Fn(Arc<RequestContext>, Next) -> BoxFuture<'static, ()> + Send + Sync + 'static,
{
    struct FnInterceptor<F>(F);

    impl<F> Interceptor for FnInterceptor<F>
    where
        F: Fn(Arc<RequestContext>, Next) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        fn handle<'a>(&'a self, ctx: Arc<RequestContext>, next: Next) -> BoxFuture<'a, ()> {
            (self.0)(ctx, next)
        }
    }

    Arc::new(FnInterceptor(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use http::Method;
    use std::sync::Mutex;

    fn recorder(label: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
        interceptor_fn(move |ctx, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:enter", label));
                next.run(ctx).await;
                log.lock().unwrap().push(format!("{}:exit", label));
            })
        })
    }

    #[tokio::test]
    async fn elements_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::new(vec![
            recorder("a", log.clone()),
            recorder("b", log.clone()),
            recorder("c", log.clone()),
        ]);

        chain.run(test_context(Method::GET, "/")).await;

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec!["a:enter", "b:enter", "c:enter", "c:exit", "b:exit", "a:exit"]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_a_no_op() {
        let ctx = test_context(Method::GET, "/");
        let chain = HandlerChain::new(Vec::new());
        assert!(chain.is_empty());
        chain.run(ctx.clone()).await;
        assert_eq!(ctx.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn abort_skips_downstream_elements() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let aborter = {
            let log = log.clone();
            interceptor_fn(move |ctx, next| {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push("aborter".to_string());
                    ctx.abort();
                    next.run(ctx).await;
                })
            })
        };
        let chain = HandlerChain::new(vec![aborter, recorder("b", log.clone())]);

        chain.run(test_context(Method::GET, "/")).await;

        assert_eq!(*log.lock().unwrap(), vec!["aborter"]);
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gatekeeper = {
            let log = log.clone();
            interceptor_fn(move |_ctx, _next| {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push("gatekeeper".to_string());
                })
            })
        };
        let chain = HandlerChain::new(vec![gatekeeper, recorder("b", log.clone())]);

        chain.run(test_context(Method::GET, "/")).await;

        assert_eq!(*log.lock().unwrap(), vec!["gatekeeper"]);
    }
}
