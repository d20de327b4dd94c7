//! Incoming HTTP request type.
//!
//! Query string and body are decoded once into the same flat field mappings
//! routes project messages from. The query is decoded as the request arrives;
//! the body only after the router has matched a route.
//!
//! | Source | Accessor | Decoded from |
//! |---|---|---|
//! | query string | [`Request::query`] | `?a=1&b=2` (a repeated key becomes an array) |
//! | body | [`Request::fields`] | `application/json` objects, urlencoded forms |
//! | path | [`Request::params`] | `{name}` segments of the matched route |

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde_json::{Map, Value};

use crate::dispatch::{Attached, SharedDispatcher};
use crate::error::Error;

/// An incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) query: Map<String, Value>,
    pub(crate) fields: Map<String, Value>,
    pub(crate) params: Map<String, Value>,
    pub(crate) extensions: Extensions,
    decoded: bool,
}

impl Request {
    /// Builder for requests that do not come off the wire: tests, or hosts
    /// that feed pliny from another server.
    pub fn builder() -> RequestBuilder {
        RequestBuilder {
            method: Method::GET,
            uri: "/".to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Map::new(),
        }
    }

    /// Reads the whole body and decodes the query. Body fields wait for
    /// [`Request::decode_body`].
    pub(crate) async fn from_hyper(req: hyper::Request<Incoming>) -> Result<Self, Error> {
        let (parts, body) = req.into_parts();
        let body = body.collect().await.map_err(Error::Read)?.to_bytes();
        let mut req = Self::from_parts(parts.method, parts.uri, parts.headers, body)?;
        req.extensions = parts.extensions;
        Ok(req)
    }

    pub(crate) fn from_parts(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Result<Self, Error> {
        let query = parse_query(uri.query().unwrap_or(""))?;
        Ok(Self {
            method,
            uri,
            headers,
            body,
            query,
            fields: Map::new(),
            params: Map::new(),
            extensions: Extensions::new(),
            decoded: false,
        })
    }

    /// Decodes the body into [`Request::fields`]. Runs once; later calls are no-ops.
    pub(crate) fn decode_body(&mut self) -> Result<(), Error> {
        if !self.decoded {
            self.fields = parse_fields(&self.headers, &self.body)?;
            self.decoded = true;
        }
        Ok(())
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header value as text; `None` if absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query-string fields.
    pub fn query(&self) -> &Map<String, Value> { &self.query }

    /// Decoded body fields. Empty unless the body is a JSON object or a form.
    pub fn fields(&self) -> &Map<String, Value> { &self.fields }

    /// Path parameters of the matched route.
    pub fn params(&self) -> &Map<String, Value> { &self.params }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// The dispatcher attached by [`Plugin::middleware`], if it ran.
    ///
    /// [`Plugin::middleware`]: crate::plugin::Plugin::middleware
    pub fn dispatcher(&self) -> Option<&SharedDispatcher> {
        self.extensions.get::<Attached>().map(|attached| &attached.0)
    }
}

// ── RequestBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Request`]. Obtain via [`Request::builder()`].
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    params: Map<String, Value>,
}

impl RequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Path and optional query, e.g. `/users/42?fields=name`.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and its content type.
    pub fn json(self, value: &Value) -> Self {
        self.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(value.to_string())
    }

    /// Sets a path parameter, as the router would after matching.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        let uri: Uri = self.uri.parse()?;
        let mut req = Request::from_parts(self.method, uri, self.headers, self.body)?;
        req.decode_body()?;
        req.params = self.params;
        Ok(req)
    }
}

// ── Field decoding ────────────────────────────────────────────────────────────

fn parse_query(raw: &str) -> Result<Map<String, Value>, Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw).map_err(Error::Query)?;
    Ok(collect_pairs(pairs))
}

fn parse_fields(headers: &HeaderMap, body: &[u8]) -> Result<Map<String, Value>, Error> {
    if body.is_empty() {
        return Ok(Map::new());
    }

    let essence = headers.get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if essence == "application/json" || essence.ends_with("+json") {
        return match serde_json::from_slice::<Value>(body).map_err(Error::Json)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        };
    }
    if essence == "application/x-www-form-urlencoded" {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).map_err(Error::Form)?;
        return Ok(collect_pairs(pairs));
    }
    Ok(Map::new())
}

/// Folds `key=value` pairs into a mapping; repeated keys collect into an array.
fn collect_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}
