//! Per-request tracing.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Wraps each request in an `info` span carrying method and path, and logs
/// status and latency once the response is ready.
///
/// Register it first so the span covers everything after it:
///
/// ```rust,no_run
/// use pliny::{Router, middleware};
///
/// let app = Router::new().with(middleware::trace());
/// ```
pub fn trace() -> Trace {
    Trace
}

/// See [`trace`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, Response> {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        Box::pin(
            async move {
                let started = Instant::now();
                let res = next.run(req).await;
                info!(
                    status = res.status_code().as_u16(),
                    latency_us = started.elapsed().as_micros() as u64,
                    "request completed"
                );
                res
            }
            .instrument(span),
        )
    }
}
