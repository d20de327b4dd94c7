//! The plugin: registration-time settings plus the two things it exports.

use std::sync::Arc;

use tracing::debug;

use crate::dispatch::{Attached, SharedDispatcher};
use crate::error::Error;
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::options::RouteOptions;
use crate::request::Request;
use crate::response::Response;
use crate::route::RouteMiddleware;

/// Bridges a [`Router`](crate::Router) to an action dispatcher.
///
/// Created once per dispatcher with plugin-wide settings; each route then
/// asks it for a [`RouteMiddleware`] with its own overrides.
///
/// ```rust,ignore
/// let pliny = Plugin::new(actions, RouteOptions::new().body(true));
///
/// let app = Router::new()
///     .with(pliny.middleware())
///     .on_with(Method::GET, "/users/{id}", pliny.route(RouteOptions::new().pin("role:user,cmd:load"))?, done)
///     .on_with(Method::POST, "/users", pliny.route(RouteOptions::new().pin("role:user,cmd:create"))?, done);
/// ```
#[derive(Clone)]
pub struct Plugin {
    dispatcher: SharedDispatcher,
    settings: RouteOptions,
}

impl Plugin {
    /// The plugin's stable name.
    pub const NAME: &'static str = "pliny";

    /// Lays `settings` over [`RouteOptions::defaults`]. Nothing is validated
    /// until a route is built.
    pub fn new(dispatcher: SharedDispatcher, settings: RouteOptions) -> Self {
        let settings = RouteOptions::defaults().layer(&settings);
        debug!(plugin = Self::NAME, ?settings, "plugin initialised");
        Self { dispatcher, settings }
    }

    pub fn name(&self) -> &'static str { Self::NAME }

    /// The plugin-wide layer every route starts from.
    pub fn settings(&self) -> &RouteOptions { &self.settings }

    pub fn dispatcher(&self) -> &SharedDispatcher { &self.dispatcher }

    /// Middleware that attaches the dispatcher to every request, readable
    /// with [`Request::dispatcher`], and always continues.
    pub fn middleware(&self) -> AttachDispatcher {
        AttachDispatcher { dispatcher: Arc::clone(&self.dispatcher) }
    }

    /// Builds the middleware for one route, with `overrides` laid over the
    /// plugin settings. Pass [`RouteOptions::new()`] for none.
    ///
    /// A text pin is parsed here, once; a malformed one is an
    /// [`Error::Pin`].
    pub fn route(&self, overrides: RouteOptions) -> Result<RouteMiddleware, Error> {
        let options = self.settings.layer(&overrides);
        let route = options.resolve()?;
        debug!(plugin = Self::NAME, ?options, "route built");
        Ok(RouteMiddleware::new(route, Arc::clone(&self.dispatcher)))
    }
}

/// See [`Plugin::middleware`].
#[derive(Clone)]
pub struct AttachDispatcher {
    dispatcher: SharedDispatcher,
}

impl Middleware for AttachDispatcher {
    fn call(&self, mut req: Request, next: Next) -> BoxFuture<'static, Response> {
        req.extensions_mut().insert(Attached(Arc::clone(&self.dispatcher)));
        next.run(req)
    }
}
