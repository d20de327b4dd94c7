//! Per-route middleware: project, dispatch, resolve.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatch::{ActResult, Dispatcher, Message, REQUEST_KEY, RESPONSE_KEY, SharedDispatcher};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::options::{Dispatch, Resolve, ResolvedRoute};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;

/// The middleware produced by [`Plugin::route`].
///
/// For every request it projects a fresh message out of the query string,
/// body, path parameters and pin, dispatches it, and resolves the outcome:
/// `Ok` continues the chain with the [`Reply`] laid over its response, `Err`
/// goes to the router's error handler and the `Reply` is dropped. A custom
/// responder takes over both.
///
/// Cloning is cheap; clones share the route's configuration.
///
/// [`Plugin::route`]: crate::plugin::Plugin::route
#[derive(Clone)]
pub struct RouteMiddleware {
    inner: Arc<Inner>,
}

struct Inner {
    route: ResolvedRoute,
    dispatcher: SharedDispatcher,
}

impl RouteMiddleware {
    pub(crate) fn new(route: ResolvedRoute, dispatcher: SharedDispatcher) -> Self {
        Self { inner: Arc::new(Inner { route, dispatcher }) }
    }

    /// The fields this route would dispatch for `req`, back-references aside.
    pub fn project(&self, req: &Request) -> Map<String, Value> {
        self.inner.project(req)
    }
}

impl Middleware for RouteMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture<'static, Response> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.run(req, next).await })
    }
}

impl Inner {
    fn project(&self, req: &Request) -> Map<String, Value> {
        let route = &self.route;
        let mut fields = Map::new();
        route.query.project(req.query(), &mut fields);
        route.body.project(req.fields(), &mut fields);
        route.params.project(req.params(), &mut fields);
        if let Some(pin) = &route.pin {
            fields.extend(pin.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        fields.remove(REQUEST_KEY);
        fields.remove(RESPONSE_KEY);
        fields
    }

    async fn run(&self, req: Request, next: Next) -> Response {
        let reply = Reply::new();
        let outcome = self.dispatch(&req, &reply).await;

        match &self.route.resolve {
            Resolve::Custom(respond) => respond(&req, reply, outcome),
            Resolve::Default => match outcome {
                Ok(_) => reply.apply(next.run(req).await),
                Err(err) => {
                    debug!(error = %err, path = req.path(), "dispatch failed, forwarding");
                    next.fail(err)
                }
            },
        }
    }

    async fn dispatch(&self, req: &Request, reply: &Reply) -> ActResult {
        let message = Message::new(self.project(req), req, reply);
        debug!(fields = message.fields().len(), path = req.path(), "dispatching message");

        let dispatcher: &dyn Dispatcher = self.dispatcher.as_ref();
        match &self.route.dispatch {
            Dispatch::Default => dispatcher.act(message).await,
            Dispatch::Custom(handler) => handler.handle(req, reply, message, dispatcher).await,
        }
    }
}
