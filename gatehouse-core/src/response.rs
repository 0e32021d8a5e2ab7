//! Response types.
//!
//! - [`TransportResponse`] - What a transport hands back: status, headers, raw body
//! - [`Payload`] - The decoded JSON body shared by the cache and every waiting caller
//!
//! A successful response is decoded once into a [`Payload`]. The payload is
//! reference counted, so the cache entry and all deduplicated callers hold
//! the same allocation.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Raw response as received from the transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TransportResponse {
    /// Creates a response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Creates a response with no headers.
    pub fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, HeaderMap::new(), body)
    }

    /// Status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consumes the response and returns the raw body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Returns a header as a string slice, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decodes the body as JSON. An empty body decodes to `null`.
    pub fn into_payload(self) -> Result<Payload, serde_json::Error> {
        Payload::from_slice(&self.body)
    }
}

/// Decoded response body.
///
/// Cloning a payload is cheap. Use [`Payload::decode`] for typed access.
#[derive(Clone, PartialEq)]
pub struct Payload(Arc<Value>);

impl Payload {
    /// Wraps an already decoded value.
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    /// Decodes JSON bytes. Empty (or whitespace-only) input decodes to `null`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new(Value::Null));
        }
        serde_json::from_slice(bytes).map(Self::new)
    }

    /// Deserializes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&*self.0)
    }

    /// Returns the underlying JSON value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Returns `true` if both payloads share one allocation.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl Deref for Payload {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Room {
        id: u32,
        capacity: u16,
    }

    #[test]
    fn test_empty_body_is_null() {
        let response = TransportResponse::with_status(StatusCode::NO_CONTENT, Bytes::new());
        assert_eq!(*response.into_payload().unwrap(), Value::Null);
    }

    #[test]
    fn test_typed_decode() {
        let payload = Payload::from_slice(br#"[{"id":1,"capacity":30},{"id":2,"capacity":12}]"#)
            .unwrap();
        let rooms: Vec<Room> = payload.decode().unwrap();
        assert_eq!(rooms[1], Room { id: 2, capacity: 12 });
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(Payload::from_slice(b"<html>").is_err());
    }

    #[test]
    fn test_clone_shares_allocation() {
        let payload = Payload::new(serde_json::json!({"ok": true}));
        let clone = payload.clone();
        assert!(Payload::ptr_eq(&payload, &clone));
        assert!(!Payload::ptr_eq(&payload, &Payload::new(serde_json::json!({"ok": true}))));
    }

    #[test]
    fn test_header_str() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "3".parse().unwrap());
        let response = TransportResponse::new(StatusCode::TOO_MANY_REQUESTS, headers, "");
        assert_eq!(response.header_str("Retry-After"), Some("3"));
        assert_eq!(response.header_str("x-missing"), None);
    }
}
