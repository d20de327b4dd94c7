//! The per-request response in progress.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use crate::response::{IntoResponse, Response};

/// A response being shaped while a request is dispatched.
///
/// One `Reply` exists per request. It travels with the [`Message`] as its
/// `res$` back-reference, so actions, custom handlers and custom responders
/// can set a status or headers through a shared borrow. When the action
/// succeeds, the collected parts are laid over the response the rest of the
/// chain produces. A failed action's reply is discarded, so the error
/// handler alone decides the status.
///
/// [`Message`]: crate::dispatch::Message
#[derive(Debug, Default)]
pub struct Reply {
    parts: Mutex<Parts>,
}

#[derive(Debug, Default)]
struct Parts {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl Reply {
    pub fn new() -> Self { Self::default() }

    /// Overrides the status of the final response.
    pub fn set_status(&self, status: StatusCode) {
        self.parts.lock().status = Some(status);
    }

    /// Sets a header on the final response, replacing earlier values.
    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.parts.lock().headers.insert(name, value);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.parts.lock().status
    }

    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.parts.lock().headers.get(name).cloned()
    }

    /// Lays the collected status and headers over `res`.
    pub fn apply(self, mut res: Response) -> Response {
        let parts = self.parts.into_inner();
        if let Some(status) = parts.status {
            res.status = status;
        }
        for (name, value) in parts.headers.iter() {
            res.headers.insert(name.clone(), value.clone());
        }
        res
    }

    /// Ends the request with `body`, shaped by everything collected so far.
    pub fn finish(self, body: impl IntoResponse) -> Response {
        self.apply(body.into_response())
    }
}
