//! Image routes.
//!
//! The HTTP surface of the image store: upload, fetch and delete by
//! name. Transformation and persistent storage live elsewhere; this
//! sub-service keeps objects in memory behind a mutex, which is all the
//! lifecycle layer needs from it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};

use crate::context::RequestContext;
use crate::handler::{handler_fn, HandlerFn};
use crate::router::Routes;
use crate::service::SubService;

/// Upload header naming the stored object.
pub const IMAGE_NAME_HEADER: &str = "x-image-name";

/// Sub-service owning the `/images` route group.
pub struct ImageService {
    store: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl ImageService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().expect("image store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upload(&self) -> HandlerFn {
        let store = self.store.clone();
        handler_fn(move |ctx: Arc<RequestContext>| {
            let store = store.clone();
            async move {
                let Some(name) = ctx.header(IMAGE_NAME_HEADER).map(str::to_string) else {
                    ctx.respond(StatusCode::BAD_REQUEST, "missing x-image-name header");
                    return;
                };
                if ctx.body().is_empty() {
                    ctx.respond(StatusCode::BAD_REQUEST, "empty image body");
                    return;
                }
                let bytes = ctx.body().clone();
                tracing::debug!(name = %name, bytes = bytes.len(), "Image stored");
                store
                    .lock()
                    .expect("image store mutex poisoned")
                    .insert(name.clone(), bytes);
                ctx.respond(StatusCode::CREATED, name);
            }
        })
    }

    fn fetch(&self) -> HandlerFn {
        let store = self.store.clone();
        handler_fn(move |ctx: Arc<RequestContext>| {
            let store = store.clone();
            async move {
                let found = image_name(ctx.path()).and_then(|name| {
                    store
                        .lock()
                        .expect("image store mutex poisoned")
                        .get(name)
                        .cloned()
                });
                match found {
                    Some(bytes) => {
                        ctx.set_header(
                            HeaderName::from_static("content-type"),
                            HeaderValue::from_static("application/octet-stream"),
                        );
                        ctx.respond(StatusCode::OK, bytes);
                    }
                    None => ctx.respond(StatusCode::NOT_FOUND, "no such image"),
                }
            }
        })
    }

    fn exists(&self) -> HandlerFn {
        let store = self.store.clone();
        handler_fn(move |ctx: Arc<RequestContext>| {
            let store = store.clone();
            async move {
                let known = image_name(ctx.path()).is_some_and(|name| {
                    store
                        .lock()
                        .expect("image store mutex poisoned")
                        .contains_key(name)
                });
                if !known {
                    ctx.set_status(StatusCode::NOT_FOUND);
                }
            }
        })
    }

    fn remove(&self) -> HandlerFn {
        let store = self.store.clone();
        handler_fn(move |ctx: Arc<RequestContext>| {
            let store = store.clone();
            async move {
                let removed = image_name(ctx.path()).and_then(|name| {
                    store
                        .lock()
                        .expect("image store mutex poisoned")
                        .remove(name)
                });
                match removed {
                    Some(_) => ctx.set_status(StatusCode::NO_CONTENT),
                    None => ctx.respond(StatusCode::NOT_FOUND, "no such image"),
                }
            }
        })
    }
}

impl Default for ImageService {
    fn default() -> Self {
        Self::new()
    }
}

impl SubService for ImageService {
    fn register_all(&self, routes: &mut Routes) {
        routes.post("/images", vec![self.upload()]);
        routes.get("/images/{name}", vec![self.fetch()]);
        routes.head("/images/{name}", vec![self.exists()]);
        routes.delete("/images/{name}", vec![self.remove()]);
    }
}

/// Object name from the trailing path segment.
fn image_name(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|s| !s.is_empty())
}
