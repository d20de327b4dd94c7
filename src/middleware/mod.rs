//! Middleware layer.
//!
//! Middleware intercepts a request before its route handler runs and is the
//! right place for cross-cutting concerns: tracing, context injection, and
//! handing the request to an action dispatcher.
//!
//! A middleware receives the request and a [`Next`] continuation and does one
//! of three things:
//!
//! - `next.run(req).await` — proceed to the next middleware or the handler;
//! - `next.fail(err)` — skip the rest of the chain and let the router's error
//!   handler answer;
//! - return a [`Response`] of its own and drop `next`.
//!
//! Global middleware (`Router::with`) runs first, in registration order,
//! then the route's own middleware, then the handler.
//!
//! Built-in middleware:
//! - [`trace()`] — per-request span with method, path, status, latency

mod trace;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub use trace::{Trace, trace};

/// Intercepts requests on their way to a handler.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, Response>;
}

/// A type-erased middleware shared across concurrent requests.
pub(crate) type BoxedMiddleware = Arc<dyn Middleware>;

/// Renders errors forwarded through [`Next::fail`].
pub(crate) type ErrorHandler = Arc<dyn Fn(Error) -> Response + Send + Sync>;

/// Adapts an async closure into a [`Middleware`].
///
/// ```rust
/// use pliny::{Request, middleware::{self, Next}};
///
/// let stamp = middleware::from_fn(|mut req: Request, next: Next| async move {
///     req.extensions_mut().insert(std::time::Instant::now());
///     next.run(req).await
/// });
/// # let _ = stamp;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, Response> {
        Box::pin((self.0)(req, next))
    }
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// Everything a matched route runs, in order.
pub(crate) struct Pipeline {
    pub(crate) global: Arc<[BoxedMiddleware]>,
    pub(crate) local: Arc<[BoxedMiddleware]>,
    pub(crate) handler: BoxedHandler,
    pub(crate) on_error: ErrorHandler,
}

impl Pipeline {
    fn middleware(&self, pos: usize) -> Option<&BoxedMiddleware> {
        match pos.checked_sub(self.global.len()) {
            None => self.global.get(pos),
            Some(local) => self.local.get(local),
        }
    }
}

/// The continuation handed to each middleware.
pub struct Next {
    pipeline: Pipeline,
    pos: usize,
}

impl Next {
    pub(crate) fn new(pipeline: Pipeline) -> Self {
        Self { pipeline, pos: 0 }
    }

    /// Proceeds to the next middleware, or to the handler at the end.
    pub fn run(mut self, req: Request) -> BoxFuture<'static, Response> {
        let pos = self.pos;
        self.pos += 1;
        match self.pipeline.middleware(pos).map(Arc::clone) {
            Some(middleware) => middleware.call(req, self),
            None => self.pipeline.handler.call(req),
        }
    }

    /// Abandons the chain and answers with the router's error handler.
    pub fn fail(self, err: Error) -> Response {
        (self.pipeline.on_error)(err)
    }
}

/// The router's error handler unless replaced with `Router::on_error`.
///
/// Server errors are logged and answered with the bare reason phrase; client
/// errors echo their message.
pub(crate) fn default_error_response(err: Error) -> Response {
    let status = err.status();
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "request failed");
        Response::builder()
            .status(status)
            .text(status.canonical_reason().unwrap_or_default())
    } else {
        debug!(error = %err, status = status.as_u16(), "request rejected");
        Response::builder().status(status).text(err.to_string())
    }
}
