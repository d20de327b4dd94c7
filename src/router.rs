//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. A route is a handler
//! plus the middleware that runs in front of it; global middleware runs in
//! front of every route.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, ErrorHandler, Middleware, Next, Pipeline, default_error_response};
use crate::request::Request;
use crate::response::Response;

struct Endpoint {
    middleware: Arc<[BoxedMiddleware]>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`] or drive it
/// directly with [`Router::handle`]. Every builder method returns `self` so
/// registrations chain naturally.
///
/// [`Server::serve`]: crate::Server::serve
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    global: Arc<[BoxedMiddleware]>,
    on_error: ErrorHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            global: Arc::from(Vec::new()),
            on_error: Arc::new(default_error_response),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, Arc::from(Vec::new()), handler)
    }

    /// Register a handler with middleware that runs only for this route —
    /// typically a [`RouteMiddleware`](crate::RouteMiddleware).
    ///
    /// # Panics
    ///
    /// As [`Router::on`].
    pub fn on_with(self, method: Method, path: &str, middleware: impl Middleware, handler: impl Handler) -> Self {
        let middleware: BoxedMiddleware = Arc::new(middleware);
        self.add(method, path, Arc::from(vec![middleware]), handler)
    }

    /// Add middleware that runs in front of every route.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        let middleware: BoxedMiddleware = Arc::new(middleware);
        self.global = self.global.iter().cloned().chain([middleware]).collect();
        self
    }

    /// Replace the handler for errors forwarded with [`Next::fail`] and for
    /// malformed requests.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(Error) -> Response + Send + Sync + 'static,
    {
        self.on_error = Arc::new(handler);
        self
    }

    fn add(mut self, method: Method, path: &str, middleware: Arc<[BoxedMiddleware]>, handler: impl Handler) -> Self {
        let endpoint = Endpoint { middleware, handler: handler.into_boxed_handler() };
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path, endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        debug!(%method, path, "route registered");
        self
    }

    /// Routes one request through its pipeline. Unmatched requests get `404`
    /// before the body is looked at; a body that fails to decode on a matched
    /// route goes to the error handler.
    pub fn handle(&self, mut req: Request) -> BoxFuture<'static, Response> {
        let Some((next, params)) = self.lookup(req.method(), req.path()) else {
            return Box::pin(std::future::ready(Response::status(StatusCode::NOT_FOUND)));
        };
        if let Err(err) = req.decode_body() {
            debug!(error = %err, path = req.path(), "malformed body");
            return Box::pin(std::future::ready(next.fail(err)));
        }
        req.params = params;
        next.run(req)
    }

    /// Answers with the error handler, outside any route.
    pub(crate) fn fail(&self, err: Error) -> Response {
        (self.on_error)(err)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(Next, Map<String, Value>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = matched.value;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), Value::String(v.to_owned())))
            .collect();
        let next = Next::new(Pipeline {
            global: Arc::clone(&self.global),
            local: Arc::clone(&endpoint.middleware),
            handler: Arc::clone(&endpoint.handler),
            on_error: Arc::clone(&self.on_error),
        });
        Some((next, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
