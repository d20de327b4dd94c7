//! Route configuration and its three-layer composition.
//!
//! Every route's effective options are built from, in increasing priority:
//!
//! 1. [`RouteOptions::defaults`] — `{ params: true }`
//! 2. plugin-wide settings, given to [`Plugin::new`]
//! 3. per-route overrides, given to [`Plugin::route`]
//!
//! An option left unset in a higher layer inherits the lower one. Two pin
//! mappings merge key by key; everything else is replaced outright.
//!
//! The data-only options deserialize from configuration:
//!
//! ```json
//! { "pin": "role:user", "query": ["limit", "offset"], "body": true, "params": false }
//! ```
//!
//! [`Plugin::new`]: crate::plugin::Plugin::new
//! [`Plugin::route`]: crate::plugin::Plugin::route

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::dispatch::{ActHandler, ActResult};
use crate::error::Error;
use crate::merge::deep_merge;
use crate::pin::{self, ParseError};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;

/// A custom resolver: turns the outcome of a dispatch into the response.
///
/// When configured it owns the response completely; the route's
/// continuation is never called.
pub type Responder = Arc<dyn Fn(&Request, Reply, ActResult) -> Response + Send + Sync>;

// ── Select ────────────────────────────────────────────────────────────────────

/// Which fields of a request source to project into the message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Select {
    /// Project nothing (`false`).
    #[default]
    Skip,
    /// Project every field present (`true`).
    All,
    /// Project only these names, when present.
    Only(Vec<String>),
}

impl Select {
    /// Copies the selected fields of `source` into `into`.
    pub fn project(&self, source: &Map<String, Value>, into: &mut Map<String, Value>) {
        match self {
            Self::Skip => {}
            Self::All => into.extend(source.iter().map(|(k, v)| (k.clone(), v.clone()))),
            Self::Only(names) => {
                for name in names {
                    if let Some(value) = source.get(name) {
                        into.insert(name.clone(), value.clone());
                    }
                }
            }
        }
    }
}

impl From<bool> for Select {
    fn from(all: bool) -> Self {
        if all { Self::All } else { Self::Skip }
    }
}

impl From<Vec<String>> for Select {
    fn from(names: Vec<String>) -> Self { Self::Only(names) }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Select {
    fn from(names: [S; N]) -> Self {
        Self::Only(names.into_iter().map(Into::into).collect())
    }
}

impl<'de> Deserialize<'de> for Select {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Names(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(all) => all.into(),
            Repr::Names(names) => Self::Only(names),
        })
    }
}

// ── PinSpec ───────────────────────────────────────────────────────────────────

/// The fixed fields a route stamps onto every message.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PinSpec {
    /// Lenient pin source, parsed once when the route is built.
    Text(String),
    /// Already a mapping.
    Fields(Map<String, Value>),
}

impl PinSpec {
    /// The pin as a mapping.
    pub fn resolve(&self) -> Result<Map<String, Value>, ParseError> {
        match self {
            Self::Text(source) => pin::parse(source),
            Self::Fields(fields) => Ok(fields.clone()),
        }
    }
}

impl From<&str> for PinSpec {
    fn from(source: &str) -> Self { Self::Text(source.to_owned()) }
}

impl From<String> for PinSpec {
    fn from(source: String) -> Self { Self::Text(source) }
}

impl From<Map<String, Value>> for PinSpec {
    fn from(fields: Map<String, Value>) -> Self { Self::Fields(fields) }
}

// ── RouteOptions ──────────────────────────────────────────────────────────────

/// One layer of route configuration. Every option is optional.
///
/// ```rust
/// use pliny::RouteOptions;
///
/// let opts = RouteOptions::new()
///     .pin("role:user,cmd:list")
///     .query(["limit", "offset"])
///     .body(true);
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteOptions {
    pin: Option<PinSpec>,
    query: Option<Select>,
    body: Option<Select>,
    params: Option<Select>,
    #[serde(skip)]
    handler: Option<Arc<dyn ActHandler>>,
    #[serde(skip)]
    response: Option<Responder>,
}

impl RouteOptions {
    /// An empty layer: overrides nothing.
    pub fn new() -> Self { Self::default() }

    /// The built-in bottom layer: project every path parameter.
    pub fn defaults() -> Self {
        Self { params: Some(Select::All), ..Self::default() }
    }

    /// Loads a layer from JSON configuration. `handler` and `response` can
    /// only be set in code.
    pub fn from_json(source: &str) -> Result<Self, Error> {
        serde_json::from_str(source).map_err(Error::Config)
    }

    pub fn pin(mut self, pin: impl Into<PinSpec>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn query(mut self, select: impl Into<Select>) -> Self {
        self.query = Some(select.into());
        self
    }

    pub fn body(mut self, select: impl Into<Select>) -> Self {
        self.body = Some(select.into());
        self
    }

    pub fn params(mut self, select: impl Into<Select>) -> Self {
        self.params = Some(select.into());
        self
    }

    /// Replaces the default dispatch call with `handler`.
    pub fn handler(mut self, handler: impl ActHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replaces the default outcome resolution with `response`.
    pub fn response<F>(mut self, response: F) -> Self
    where
        F: Fn(&Request, Reply, ActResult) -> Response + Send + Sync + 'static,
    {
        self.response = Some(Arc::new(response));
        self
    }

    pub fn pin_spec(&self) -> Option<&PinSpec> { self.pin.as_ref() }
    pub fn query_select(&self) -> Option<&Select> { self.query.as_ref() }
    pub fn body_select(&self) -> Option<&Select> { self.body.as_ref() }
    pub fn params_select(&self) -> Option<&Select> { self.params.as_ref() }

    /// Lays `over` on top of `self`, returning the combined layer.
    pub fn layer(&self, over: &RouteOptions) -> RouteOptions {
        let pin = match (&self.pin, &over.pin) {
            (Some(PinSpec::Fields(base)), Some(PinSpec::Fields(patch))) => {
                Some(PinSpec::Fields(deep_merge(base, patch)))
            }
            (base, patch) => patch.clone().or_else(|| base.clone()),
        };

        RouteOptions {
            pin,
            query: over.query.clone().or_else(|| self.query.clone()),
            body: over.body.clone().or_else(|| self.body.clone()),
            params: over.params.clone().or_else(|| self.params.clone()),
            handler: over.handler.clone().or_else(|| self.handler.clone()),
            response: over.response.clone().or_else(|| self.response.clone()),
        }
    }

    /// Fixes this layer into the configuration a route runs with, parsing a
    /// text pin.
    pub(crate) fn resolve(&self) -> Result<ResolvedRoute, Error> {
        let pin = match &self.pin {
            Some(PinSpec::Text(source)) if source.trim().is_empty() => None,
            Some(spec) => Some(spec.resolve()?),
            None => None,
        };

        Ok(ResolvedRoute {
            query: self.query.clone().unwrap_or_default(),
            body: self.body.clone().unwrap_or_default(),
            params: self.params.clone().unwrap_or_default(),
            pin,
            dispatch: match &self.handler {
                Some(handler) => Dispatch::Custom(Arc::clone(handler)),
                None => Dispatch::Default,
            },
            resolve: match &self.response {
                Some(response) => Resolve::Custom(Arc::clone(response)),
                None => Resolve::Default,
            },
        })
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("pin", &self.pin)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("params", &self.params)
            .field("handler", &self.handler.as_ref().map(|_| "custom"))
            .field("response", &self.response.as_ref().map(|_| "custom"))
            .finish()
    }
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// How a route submits its message.
#[derive(Clone)]
pub(crate) enum Dispatch {
    Default,
    Custom(Arc<dyn ActHandler>),
}

/// How a route turns the outcome into a response.
#[derive(Clone)]
pub(crate) enum Resolve {
    Default,
    Custom(Responder),
}

/// A route's fixed configuration: selectors, parsed pin and strategies.
pub(crate) struct ResolvedRoute {
    pub(crate) query: Select,
    pub(crate) body: Select,
    pub(crate) params: Select,
    pub(crate) pin: Option<Map<String, Value>>,
    pub(crate) dispatch: Dispatch,
    pub(crate) resolve: Resolve,
}
