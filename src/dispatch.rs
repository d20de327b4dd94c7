//! The seam between routes and the action dispatcher.
//!
//! A route turns each request into a [`Message`] and hands it to a
//! [`Dispatcher`], which matches the message's fields against whatever
//! actions it knows and eventually resolves to an [`ActResult`]. How actions
//! are registered and matched is entirely the dispatcher's business.
//!
//! ```text
//! Request ──project──▶ Message { fields, req$, res$ }
//!                          │
//!                          ▼
//!          ActHandler::handle   or   Dispatcher::act
//!                          │
//!                          ▼
//!                   ActResult ──resolve──▶ Response
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::reply::Reply;
use crate::request::Request;

/// Reserved key of the request back-reference.
pub const REQUEST_KEY: &str = "req$";

/// Reserved key of the response back-reference.
pub const RESPONSE_KEY: &str = "res$";

/// What an action resolves to.
pub type ActResult = Result<Value, Error>;

// ── Message ───────────────────────────────────────────────────────────────────

/// The payload submitted to the dispatcher for one request.
///
/// A flat mapping of projected fields plus borrowed back-references to the
/// request (`req$`) and its [`Reply`] (`res$`). The borrows tie a message to
/// the request that produced it: it cannot be stored past that request, and
/// serialising it writes the fields only.
pub struct Message<'a> {
    fields: Map<String, Value>,
    request: &'a Request,
    reply: &'a Reply,
}

impl<'a> Message<'a> {
    /// Builds a message by hand, e.g. to dispatch from a handler via
    /// [`Request::dispatcher`]. Reserved keys in `fields` are dropped.
    pub fn new(mut fields: Map<String, Value>, request: &'a Request, reply: &'a Reply) -> Self {
        fields.remove(REQUEST_KEY);
        fields.remove(RESPONSE_KEY);
        Self { fields, request, reply }
    }

    pub fn fields(&self) -> &Map<String, Value> { &self.fields }
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> { &mut self.fields }
    pub fn into_fields(self) -> Map<String, Value> { self.fields }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Shorthand for a string-valued field.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// The request this message was projected from (`req$`).
    pub fn request(&self) -> &'a Request { self.request }

    /// The response in progress for that request (`res$`).
    pub fn reply(&self) -> &'a Reply { self.reply }
}

impl Serialize for Message<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("fields", &self.fields)
            .field("path", &self.request.path())
            .finish_non_exhaustive()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// The action dispatcher a plugin submits messages to.
pub trait Dispatcher: Send + Sync + 'static {
    fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult>;
}

/// Shared handle to a dispatcher.
pub type SharedDispatcher = Arc<dyn Dispatcher>;

/// Adapts an async function over the projected fields into a [`Dispatcher`].
///
/// The function receives the fields by value and never sees the
/// back-references; implement [`Dispatcher`] directly when an action needs
/// the request or reply.
///
/// ```rust
/// use pliny::dispatch;
/// use serde_json::json;
///
/// let actions = dispatch::from_fn(|fields| async move {
///     match fields.get("cmd").and_then(|v| v.as_str()) {
///         Some("ping") => Ok(json!({"pong": true})),
///         _ => Err(pliny::Error::rejected(http::StatusCode::NOT_FOUND, "no matching action")),
///     }
/// });
/// # let _ = actions;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnDispatcher<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActResult> + Send + 'static,
{
    FnDispatcher(f)
}

/// See [`from_fn`].
pub struct FnDispatcher<F>(F);

impl<F, Fut> Dispatcher for FnDispatcher<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActResult> + Send + 'static,
{
    fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult> {
        Box::pin((self.0)(message.into_fields()))
    }
}

/// Marks the dispatcher attached to a request by the context middleware.
#[derive(Clone)]
pub(crate) struct Attached(pub(crate) SharedDispatcher);

// ── ActHandler ────────────────────────────────────────────────────────────────

/// A custom dispatch step that replaces the route's default `act` call.
///
/// Receives the request, its reply, the fully projected message (pin and
/// back-references included) and the dispatcher, and resolves to the outcome
/// the route then resolves as usual. It may rewrite the message, call the
/// dispatcher any number of times, or answer without it.
pub trait ActHandler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        reply: &'a Reply,
        message: Message<'a>,
        dispatcher: &'a dyn Dispatcher,
    ) -> BoxFuture<'a, ActResult>;
}
