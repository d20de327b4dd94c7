//! # pliny
//!
//! Routes HTTP requests into a message-oriented action dispatcher.
//!
//! A route declares which request fields matter to it — some or all of the
//! query string, the decoded body, the path parameters — plus a fixed *pin*
//! such as `role:user,cmd:load`. Each request on that route is projected
//! into one flat message, handed to the dispatcher, and the outcome flows
//! back into the middleware chain: success continues to the next handler,
//! failure goes to the error handler.
//!
//! ## Pieces
//!
//! - [`Plugin`] — holds the dispatcher and plugin-wide [`RouteOptions`];
//!   exports the context middleware and the route factory
//! - [`RouteMiddleware`] — one per route; project, dispatch, resolve
//! - [`Dispatcher`] / [`ActHandler`] — the seam to the action system
//! - [`Router`] / [`Server`] — the radix-tree router and hyper server it runs in
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use http::Method;
//! use pliny::{Plugin, Request, RouteOptions, Router, Server, dispatch, middleware};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pliny::Error> {
//!     let actions = dispatch::from_fn(|msg| async move {
//!         // match `msg` against your actions here
//!         Ok(json!({"ok": true}))
//!     });
//!
//!     let pliny = Plugin::new(Arc::new(actions), RouteOptions::new().query(true));
//!
//!     let app = Router::new()
//!         .with(middleware::trace())
//!         .with(pliny.middleware())
//!         .on_with(
//!             Method::GET,
//!             "/users/{id}",
//!             pliny.route(RouteOptions::new().pin("role:user,cmd:load"))?,
//!             done,
//!         );
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn done(_req: Request) -> &'static str { "ok" }
//! ```

mod error;
mod handler;
mod reply;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod dispatch;
pub mod merge;
pub mod middleware;
pub mod options;
pub mod pin;
pub mod plugin;

pub use dispatch::{ActHandler, ActResult, Dispatcher, Message, SharedDispatcher};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, Handler};
pub use options::{PinSpec, Responder, RouteOptions, Select};
pub use plugin::{AttachDispatcher, Plugin};
pub use reply::Reply;
pub use request::{Request, RequestBuilder};
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use route::RouteMiddleware;
pub use router::Router;
pub use server::Server;
