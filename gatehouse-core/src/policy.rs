//! Request policy classification.
//!
//! Before a call is dispatched the pipeline decides how much of the caching
//! machinery it takes part in. [`RequestPolicy`] is the outcome of that
//! decision:
//!
//! | Method | `no_cache` | Policy                                  |
//! |--------|------------|-----------------------------------------|
//! | `GET`  | `false`    | [`RequestPolicy::Cached`]               |
//! | `GET`  | `true`     | [`RequestPolicy::Deduplicated`]         |
//! | other  | any        | [`RequestPolicy::Direct`]               |
//!
//! The decision is made on the method only. Whether a request carries a
//! body is irrelevant.
//!
//! ```
//! use gatehouse_core::{Method, RequestDescriptor, RequestPolicy};
//!
//! let read = RequestDescriptor::new(Method::Get, "https://api.campus.edu", "/rooms");
//! assert!(matches!(read.policy(), RequestPolicy::Cached(_)));
//!
//! let write = RequestDescriptor::new(Method::Post, "https://api.campus.edu", "/rooms");
//! assert!(matches!(write.policy(), RequestPolicy::Direct));
//! ```

use crate::key::RequestKey;
use crate::request::RequestDescriptor;

/// How a call participates in caching and deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPolicy {
    /// Read: consult the response cache, then deduplicate, then populate the cache.
    Cached(RequestKey),
    /// Read opted out of caching: deduplicate only.
    Deduplicated(RequestKey),
    /// Mutating call: dispatch directly, every time.
    Direct,
}

impl RequestPolicy {
    /// Classifies a descriptor.
    pub fn from_descriptor(descriptor: &RequestDescriptor) -> Self {
        if !descriptor.method().is_read() {
            return RequestPolicy::Direct;
        }
        let key = RequestKey::canonicalize(descriptor);
        if descriptor.options().no_cache {
            RequestPolicy::Deduplicated(key)
        } else {
            RequestPolicy::Cached(key)
        }
    }

    /// Returns the request key, if this policy has one.
    pub fn key(&self) -> Option<&RequestKey> {
        match self {
            RequestPolicy::Cached(key) | RequestPolicy::Deduplicated(key) => Some(key),
            RequestPolicy::Direct => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestOptions};

    #[test]
    fn test_opted_out_read_is_deduplicated() {
        let descriptor = RequestDescriptor::new(Method::Get, "https://api.campus.edu", "/grades")
            .with_options(RequestOptions {
                no_cache: true,
                ..RequestOptions::default()
            });
        let policy = descriptor.policy();
        assert!(matches!(policy, RequestPolicy::Deduplicated(_)));
        assert_eq!(policy.key(), Some(&RequestKey::canonicalize(&descriptor)));
    }

    #[test]
    fn test_writes_are_direct_even_with_options() {
        for method in [Method::Post, Method::Put, Method::Patch, Method::Delete] {
            let descriptor = RequestDescriptor::new(method, "https://api.campus.edu", "/grades");
            assert_eq!(descriptor.policy(), RequestPolicy::Direct);
            assert!(descriptor.policy().key().is_none());
        }
    }
}
