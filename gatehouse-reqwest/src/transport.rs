//! Transport over reqwest-middleware's client.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use gatehouse_core::{OutgoingRequest, Transport, TransportError, TransportResponse};
use http::HeaderValue;
use http::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::trace;

const APPLICATION_JSON: &str = "application/json";

/// Sends gatehouse requests with a reqwest client.
///
/// Non-2xx statuses are returned as normal responses; only failures where
/// nothing usable came back are mapped to [`TransportError`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ClientWithMiddleware,
}

impl ReqwestTransport {
    /// Wraps a plain reqwest client.
    pub fn new(client: reqwest::Client) -> Self {
        Self::from_middleware(ClientBuilder::new(client).build())
    }

    /// Wraps a client with a middleware stack.
    pub fn from_middleware(client: ClientWithMiddleware) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::new(client)
    }
}

impl From<ClientWithMiddleware> for ReqwestTransport {
    fn from(client: ClientWithMiddleware) -> Self {
        Self::from_middleware(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        let url = request_url(&request)?;
        trace!(method = %request.method(), url = %url, "sending request");

        let mut builder = self
            .client
            .request(request.method().into(), url)
            .headers(request.headers().clone())
            .header(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));
        if let Some(body) = request.body() {
            let body = serde_json::to_vec(body).map_err(TransportError::request)?;
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
                .body(body);
        }

        let response = builder.send().await.map_err(middleware_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| reqwest_error(error, TransportError::body))?;
        trace!(status = status.as_u16(), bytes = body.len(), "received response");

        Ok(TransportResponse::new(status, headers, body))
    }
}

fn request_url(request: &OutgoingRequest) -> Result<Url, TransportError> {
    let pairs = request.query().pairs();
    if pairs.is_empty() {
        Url::parse(request.url())
    } else {
        Url::parse_with_params(request.url(), pairs)
    }
    .map_err(TransportError::request)
}

fn middleware_error(error: reqwest_middleware::Error) -> TransportError {
    match error {
        reqwest_middleware::Error::Reqwest(error) => reqwest_error(error, TransportError::connection),
        reqwest_middleware::Error::Middleware(error) => {
            let error: Box<dyn StdError + Send + Sync> = error.into();
            TransportError::Connection(Arc::from(error))
        }
    }
}

/// Classifies a reqwest error, using `fallback` when reqwest gives no hint.
fn reqwest_error(
    error: reqwest::Error,
    fallback: fn(reqwest::Error) -> TransportError,
) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error)
    } else if error.is_connect() {
        TransportError::connection(error)
    } else if error.is_builder() {
        TransportError::request(error)
    } else {
        fallback(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::{Method, RequestDescriptor};

    #[test]
    fn test_request_url_appends_query_in_order() {
        let request = OutgoingRequest::from_descriptor(
            &RequestDescriptor::new(Method::Get, "https://api.campus.edu", "/students")
                .with_query("dept", 5)
                .with_query("name", "Ada Lovelace"),
        );
        let url = request_url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.campus.edu/students?dept=5&name=Ada+Lovelace"
        );
    }

    #[test]
    fn test_request_url_without_query() {
        let request = OutgoingRequest::from_descriptor(&RequestDescriptor::new(
            Method::Get,
            "https://api.campus.edu",
            "/rooms",
        ));
        assert_eq!(
            request_url(&request).unwrap().as_str(),
            "https://api.campus.edu/rooms"
        );
    }

    #[test]
    fn test_invalid_url_is_a_request_error() {
        let request = OutgoingRequest::from_descriptor(&RequestDescriptor::new(
            Method::Get,
            "not a url",
            "/rooms",
        ));
        assert_eq!(request_url(&request).unwrap_err().kind(), "request");
    }
}
