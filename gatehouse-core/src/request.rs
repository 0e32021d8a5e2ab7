//! Request description types.
//!
//! This module provides the types a caller uses to describe a call, and the
//! type the transport receives once the pipeline has prepared it:
//!
//! - [`Method`] - The HTTP verbs the gateway speaks
//! - [`QueryParams`] - Ordered query parameters with a canonical form
//! - [`RequestOptions`] - Per-call knobs (cache opt-out, base override, TTL)
//! - [`RequestDescriptor`] - Everything that identifies one logical call
//! - [`OutgoingRequest`] - The wire-level request handed to a [`Transport`]
//!
//! [`Transport`]: crate::Transport

use std::fmt;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use smol_str::SmolStr;
use url::form_urlencoded;

use crate::policy::RequestPolicy;

/// HTTP method of a gateway call.
///
/// Only [`Method::Get`] is a read; every other verb is treated as mutating
/// and bypasses the response cache and the in-flight registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read a resource.
    Get,
    /// Create a resource.
    Post,
    /// Replace a resource.
    Put,
    /// Partially update a resource.
    Patch,
    /// Delete a resource.
    Delete,
}

impl Method {
    /// Returns the method as an upper-case string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the method is a read.
    #[inline]
    pub const fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
        }
    }
}

/// Query parameters in insertion order.
///
/// Insertion order is kept for the wire; [`QueryParams::canonical`] gives
/// the order-independent form used for request keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(SmolStr, SmolStr)>,
}

impl QueryParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter. Repeated names are allowed.
    pub fn push(&mut self, name: impl Into<SmolStr>, value: impl ToString) {
        self.pairs.push((name.into(), SmolStr::new(value.to_string())));
    }

    /// Returns the parameters in insertion order.
    pub fn pairs(&self) -> &[(SmolStr, SmolStr)] {
        &self.pairs
    }

    /// Returns `true` if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Serializes the parameters in canonical order.
    ///
    /// Pairs are sorted by name, then by value, form-urlencoded and joined
    /// as `name=value&name=value`. Separators inside a name or value are
    /// escaped, so distinct parameter sets never serialize alike. An empty
    /// list serializes to `""`.
    pub fn canonical(&self) -> String {
        let mut sorted: Vec<&(SmolStr, SmolStr)> = self.pairs.iter().collect();
        sorted.sort_unstable();

        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted.into_iter().map(|(name, value)| (name.as_str(), value.as_str())))
            .finish()
    }
}

impl<N, V> FromIterator<(N, V)> for QueryParams
where
    N: Into<SmolStr>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.push(name, value);
        }
        params
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Skip the response cache for this call (reads still deduplicate).
    pub no_cache: bool,
    /// Send this call to a different base endpoint than the client default.
    pub base_endpoint: Option<String>,
    /// Freshness window for this call instead of the cache default.
    pub ttl: Option<Duration>,
}

/// Everything that identifies one logical gateway call.
///
/// Descriptors are immutable once handed to the client.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    base_endpoint: String,
    path: String,
    query: QueryParams,
    body: Option<Value>,
    options: RequestOptions,
}

impl RequestDescriptor {
    /// Creates a descriptor with no parameters, no body and default options.
    pub fn new(method: Method, base_endpoint: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            base_endpoint: base_endpoint.into(),
            path: path.into(),
            query: QueryParams::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    /// Adds a query parameter.
    pub fn with_query(mut self, name: impl Into<SmolStr>, value: impl ToString) -> Self {
        self.query.push(name, value);
        self
    }

    /// Replaces all query parameters.
    pub fn with_params(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replaces the per-call options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Effective base endpoint: the per-call override if set, else the default.
    pub fn base_endpoint(&self) -> &str {
        self.options
            .base_endpoint
            .as_deref()
            .unwrap_or(&self.base_endpoint)
    }

    /// Path relative to the base endpoint.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// JSON body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Per-call options.
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Full URL without the query string.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_endpoint(), self.path)
    }

    /// Classifies this call for the pipeline.
    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy::from_descriptor(self)
    }
}

/// The wire-level request a [`Transport`](crate::Transport) sends.
///
/// Built from a [`RequestDescriptor`] at the start of every call. Headers
/// (notably `Authorization`) are added by the pipeline before dispatch.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    method: Method,
    url: String,
    path: String,
    query: QueryParams,
    headers: HeaderMap,
    body: Option<Value>,
}

impl OutgoingRequest {
    /// Prepares a descriptor for dispatch.
    pub fn from_descriptor(descriptor: &RequestDescriptor) -> Self {
        Self {
            method: descriptor.method(),
            url: descriptor.url(),
            path: descriptor.path().to_owned(),
            query: descriptor.query().clone(),
            headers: HeaderMap::new(),
            body: descriptor.body().cloned(),
        }
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Full URL without the query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Path relative to the base endpoint.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in insertion order.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// JSON body, if any.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}
