//! The client facade.
//!
//! [`ApiClient`] wires the pipeline together. Every call goes through the
//! same steps:
//!
//! 1. The call is classified by method and options ([`RequestPolicy`]).
//! 2. A cacheable read is answered from the [`ResponseCache`] when a fresh
//!    entry exists. Nothing else happens on a hit.
//! 3. Otherwise a read joins (or starts) the in-flight dispatch for its key;
//!    a write is dispatched on its own.
//! 4. A dispatch attaches the session credential, sends the request and
//!    feeds the outcome to the [`FailurePolicy`], retrying once on 429 and
//!    resetting the session on 401.
//! 5. A successful cacheable read is stored before the in-flight entry is
//!    released, unless the session changed while it was in flight.
//!
//! Reads only share flights started under the current session generation,
//! so a read issued after logout or a 401 never sees the previous session's
//! response.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::{
    CacheStatus, Method, OutgoingRequest, Payload, QueryParams, RequestContext,
    RequestDescriptor, RequestKey, RequestOptions, RequestPolicy, ResponseSource, Transport,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, field, info_span, warn};

use crate::cache::ResponseCache;
use crate::concurrency::{ConcurrencyDecision, InFlightRegistry};
use crate::config::{ClientConfig, NotSet};
use crate::error::{ApiError, ApiResult};
use crate::failure::{Attempt, Decision, FailurePolicy};
use crate::metrics;
use crate::session::{NoopSessionHooks, SessionCredential, SessionHooks};

struct ClientInner {
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    in_flight: InFlightRegistry<ApiResult<Payload>>,
    session: Arc<SessionCredential>,
    hooks: Arc<dyn SessionHooks>,
    policy: FailurePolicy,
    base_endpoint: String,
    sweeper: Option<JoinHandle<()>>,
}

impl ClientInner {
    fn reset_session(&self) {
        self.session.clear();
        self.cache.clear();
        self.hooks.clear_persisted_session();
        self.hooks.navigate_to_login();
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

/// Gateway client with request deduplication, a short-lived response cache
/// and rate-limit retry.
///
/// Cloning is cheap; clones share the cache, the in-flight registry and the
/// session.
///
/// # Examples
///
/// ```rust,ignore
/// let client = ApiClient::builder()
///     .transport(ReqwestTransport::new(reqwest::Client::new()))
///     .config(ClientConfig::builder().base_endpoint("https://api.campus.edu").build())
///     .build();
///
/// let students = client.get("/students").query("dept", 5).send().await?;
/// ```
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Creates a [`ApiClientBuilder`].
    pub fn builder() -> ApiClientBuilder<NotSet> {
        ApiClientBuilder::new()
    }

    /// Creates a client with default hooks and a fresh session.
    pub fn new<T>(transport: T, config: ClientConfig) -> Self
    where
        T: Transport + 'static,
    {
        Self::builder().transport(transport).config(config).build()
    }

    /// The session credential shared by every call.
    pub fn session(&self) -> &Arc<SessionCredential> {
        &self.inner.session
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.inner.cache
    }

    /// Default base endpoint.
    pub fn base_endpoint(&self) -> &str {
        &self.inner.base_endpoint
    }

    /// Number of reads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Forgets the credential and every cached response.
    ///
    /// Session hooks are not fired; the caller is already handling the logout.
    pub fn logout(&self) {
        self.inner.session.clear();
        self.inner.cache.clear();
        debug!("session cleared by logout");
    }

    /// Creates a descriptor against the default base endpoint.
    pub fn descriptor(&self, method: Method, path: impl Into<String>) -> RequestDescriptor {
        RequestDescriptor::new(method, self.inner.base_endpoint.clone(), path)
    }

    /// Starts a GET call.
    pub fn get(&self, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Method::Get, path.into())
    }

    /// Starts a POST call.
    pub fn post(&self, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Method::Post, path.into())
    }

    /// Starts a PUT call.
    pub fn put(&self, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Method::Put, path.into())
    }

    /// Starts a PATCH call.
    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Method::Patch, path.into())
    }

    /// Starts a DELETE call.
    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(self.clone(), Method::Delete, path.into())
    }

    /// GETs `path` and decodes the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: impl Into<String>) -> ApiResult<T> {
        self.get(path).send_json().await
    }

    /// Performs one logical call.
    pub async fn request(&self, descriptor: RequestDescriptor) -> ApiResult<Payload> {
        self.request_with_context(descriptor)
            .await
            .map(|(payload, _)| payload)
    }

    /// Performs one logical call and reports where the result came from.
    pub async fn request_with_context(
        &self,
        descriptor: RequestDescriptor,
    ) -> ApiResult<(Payload, RequestContext)> {
        let method = descriptor.method();
        let span = info_span!(
            "gatehouse.request",
            method = %method,
            path = %descriptor.path(),
            cache = field::Empty,
            source = field::Empty,
        );
        let started = Instant::now();
        async move {
            let result = self.execute(descriptor).await;
            match &result {
                Ok((_, ctx)) => {
                    let span = tracing::Span::current();
                    span.record("cache", ctx.status.as_str());
                    span.record("source", ctx.source.as_str());
                    metrics::record_context_metrics(ctx, method.as_str(), started.elapsed());
                }
                Err(error) => debug!(kind = error.kind(), error = %error, "request failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        descriptor: RequestDescriptor,
    ) -> ApiResult<(Payload, RequestContext)> {
        match descriptor.policy() {
            RequestPolicy::Cached(key) => {
                let ttl = descriptor
                    .options()
                    .ttl
                    .unwrap_or_else(|| self.inner.cache.ttl());
                if let Some(payload) = self.inner.cache.get_with_ttl(&key, ttl) {
                    debug!(key = %key, "cache hit");
                    return Ok((payload, RequestContext::hit()));
                }
                debug!(key = %key, "cache miss");
                self.deduplicated(key, descriptor, CacheStatus::Miss).await
            }
            RequestPolicy::Deduplicated(key) => {
                self.deduplicated(key, descriptor, CacheStatus::Bypass)
                    .await
            }
            RequestPolicy::Direct => {
                let payload = dispatch(&self.inner, &descriptor).await?;
                Ok((
                    payload,
                    RequestContext::new(CacheStatus::Bypass, ResponseSource::Network),
                ))
            }
        }
    }

    async fn deduplicated(
        &self,
        key: RequestKey,
        descriptor: RequestDescriptor,
        status: CacheStatus,
    ) -> ApiResult<(Payload, RequestContext)> {
        let store = status == CacheStatus::Miss;
        let generation = self.inner.session.generation();
        let decision = self.inner.in_flight.dedupe(&key, generation, || {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            async move {
                let result = dispatch(&inner, &descriptor).await;
                if store
                    && let Ok(payload) = &result
                    && !inner.cache.put_if(key, payload.clone(), || {
                        inner.session.generation() == generation
                    })
                {
                    debug!("session changed while in flight, response not cached");
                }
                result
            }
        });
        let source = match &decision {
            ConcurrencyDecision::Proceed(_) => ResponseSource::Network,
            ConcurrencyDecision::Await(_) => {
                debug!(key = %key, "joined in-flight request");
                ResponseSource::InFlight
            }
        };
        let payload = decision.into_future().await??;
        Ok((payload, RequestContext::new(status, source)))
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_endpoint", &self.inner.base_endpoint)
            .field("cache", &self.inner.cache)
            .field("in_flight", &self.inner.in_flight.len())
            .field("session", &self.inner.session)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

/// Sends one logical call, applying the failure policy to every attempt.
async fn dispatch(inner: &ClientInner, descriptor: &RequestDescriptor) -> ApiResult<Payload> {
    let method = descriptor.method().as_str();
    let mut attempt = Attempt::First;
    loop {
        let mut request = OutgoingRequest::from_descriptor(descriptor);
        inner.session.attach(&mut request);

        let started = Instant::now();
        let outcome = inner.transport.send(request).await;
        metrics::record_dispatch(
            method,
            outcome.as_ref().ok().map(|response| response.status().as_u16()),
            started.elapsed(),
        );

        match inner.policy.decide(attempt, descriptor.path(), outcome) {
            Decision::Success(response) => {
                return response.into_payload().map_err(ApiError::decode);
            }
            Decision::Retry { delay } => {
                warn!(?delay, "rate limited, retrying once");
                metrics::record_rate_limit_retry();
                tokio::time::sleep(delay).await;
                attempt = Attempt::Retried;
            }
            Decision::Unauthorized { reset_session } => {
                metrics::record_unauthorized(reset_session);
                if reset_session {
                    warn!("credential rejected, resetting session");
                    inner.reset_session();
                }
                return Err(ApiError::Unauthorized {
                    path: descriptor.path().to_owned(),
                });
            }
            Decision::Fail(error) => return Err(error),
        }
    }
}

/// Builder for [`ApiClient`].
///
/// Use [`ApiClient::builder()`] to create a new builder. The transport is
/// the only required field.
pub struct ApiClientBuilder<T> {
    transport: T,
    config: ClientConfig,
    session: Option<Arc<SessionCredential>>,
    hooks: Arc<dyn SessionHooks>,
}

impl ApiClientBuilder<NotSet> {
    /// Creates a new builder with no transport set.
    pub fn new() -> Self {
        Self {
            transport: NotSet,
            config: ClientConfig::default(),
            session: None,
            hooks: Arc::new(NoopSessionHooks),
        }
    }
}

impl Default for ApiClientBuilder<NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ApiClientBuilder<T> {
    /// Sets the transport.
    pub fn transport<NewT>(self, transport: NewT) -> ApiClientBuilder<NewT>
    where
        NewT: Transport + 'static,
    {
        ApiClientBuilder {
            transport,
            config: self.config,
            session: self.session,
            hooks: self.hooks,
        }
    }

    /// Sets the configuration.
    pub fn config(self, config: ClientConfig) -> Self {
        Self { config, ..self }
    }

    /// Shares an existing credential instead of creating a new one.
    pub fn session(self, session: Arc<SessionCredential>) -> Self {
        Self {
            session: Some(session),
            ..self
        }
    }

    /// Sets the hooks fired when the server rejects the session.
    pub fn hooks<H>(self, hooks: H) -> Self
    where
        H: SessionHooks + 'static,
    {
        Self {
            hooks: Arc::new(hooks),
            ..self
        }
    }
}

impl<T> ApiClientBuilder<T>
where
    T: Transport + 'static,
{
    /// Builds the [`ApiClient`].
    ///
    /// A configured sweep interval starts a background task, which needs a
    /// tokio runtime; outside one the sweeper is skipped with a warning.
    pub fn build(self) -> ApiClient {
        let ClientConfig {
            base_endpoint,
            cache,
            retry,
            auth,
        } = self.config;

        let response_cache = Arc::new(match cache.capacity {
            Some(capacity) => ResponseCache::with_capacity(cache.ttl, capacity),
            None => ResponseCache::new(cache.ttl),
        });
        let sweeper = cache
            .sweep_interval
            .and_then(|interval| spawn_sweeper(&response_cache, interval));
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(SessionCredential::new(SmolStr::new(&auth.scheme))));

        ApiClient {
            inner: Arc::new(ClientInner {
                transport: Arc::new(self.transport),
                cache: response_cache,
                in_flight: InFlightRegistry::new(),
                session,
                hooks: self.hooks,
                policy: FailurePolicy::new(&retry, &auth),
                base_endpoint,
                sweeper,
            }),
        }
    }
}

fn spawn_sweeper(cache: &Arc<ResponseCache>, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        warn!("cache sweep interval is zero, sweeper disabled");
        return None;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(_) => Some(cache.spawn_sweeper(interval)),
        Err(_) => {
            warn!("no tokio runtime, cache sweeper disabled");
            None
        }
    }
}

/// A call being assembled.
///
/// Returned by [`ApiClient::get`] and friends. Nothing is sent until
/// [`send`](Self::send) or [`send_json`](Self::send_json) is awaited.
#[must_use = "a request does nothing until it is sent"]
pub struct RequestBuilder {
    client: ApiClient,
    method: Method,
    path: String,
    query: QueryParams,
    body: Option<serde_json::Value>,
    options: RequestOptions,
    error: Option<ApiError>,
}

impl RequestBuilder {
    fn new(client: ApiClient, method: Method, path: String) -> Self {
        Self {
            client,
            method,
            path,
            query: QueryParams::new(),
            body: None,
            options: RequestOptions::default(),
            error: None,
        }
    }

    /// Adds a query parameter.
    pub fn query(mut self, name: impl Into<SmolStr>, value: impl ToString) -> Self {
        self.query.push(name, value);
        self
    }

    /// Adds a query parameter if `value` is present.
    pub fn query_opt<V: ToString>(self, name: impl Into<SmolStr>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    /// Adds every pair of `params`.
    pub fn params(mut self, params: QueryParams) -> Self {
        for (name, value) in params.pairs() {
            self.query.push(name.clone(), value);
        }
        self
    }

    /// Sets a JSON body. An encoding failure is reported by `send`.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(error) => self.error = Some(ApiError::encode(error)),
        }
        self
    }

    /// Skips the response cache for this call. Reads still deduplicate.
    pub fn no_cache(mut self) -> Self {
        self.options.no_cache = true;
        self
    }

    /// Uses `ttl` instead of the cache default for this call's cache lookup.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = Some(ttl);
        self
    }

    /// Sends this call to another base endpoint.
    pub fn base_endpoint(mut self, base_endpoint: impl Into<String>) -> Self {
        self.options.base_endpoint = Some(base_endpoint.into());
        self
    }

    /// Finishes the builder without sending.
    pub fn build(self) -> ApiResult<(ApiClient, RequestDescriptor)> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut descriptor = self
            .client
            .descriptor(self.method, self.path)
            .with_params(self.query)
            .with_options(self.options);
        if let Some(body) = self.body {
            descriptor = descriptor.with_body(body);
        }
        Ok((self.client, descriptor))
    }

    /// Sends the call.
    pub async fn send(self) -> ApiResult<Payload> {
        let (client, descriptor) = self.build()?;
        client.request(descriptor).await
    }

    /// Sends the call and reports where the result came from.
    pub async fn send_with_context(self) -> ApiResult<(Payload, RequestContext)> {
        let (client, descriptor) = self.build()?;
        client.request_with_context(descriptor).await
    }

    /// Sends the call and decodes the body into `T`.
    pub async fn send_json<T: DeserializeOwned>(self) -> ApiResult<T> {
        self.send().await?.decode().map_err(ApiError::decode)
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("options", &self.options)
            .finish()
    }
}
