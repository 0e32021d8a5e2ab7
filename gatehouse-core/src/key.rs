//! Request key types and canonicalization.
//!
//! A [`RequestKey`] is the identity of a read request. The response cache and
//! the in-flight registry are both keyed by it, so two descriptors that mean
//! the same request must produce the same key.
//!
//! ## Format
//!
//! Keys follow this format:
//! `{method}|{base}{path}|{name1}={value1}&{name2}={value2}`
//!
//! - The method is lower-cased
//! - `%` and `|` in the method, base and path are percent-escaped
//! - Query parameters are sorted by name, then by value, and form-urlencoded
//! - No parameters serialize to an empty trailing segment
//! - Request bodies never take part in the key
//!
//! ```
//! use gatehouse_core::{Method, RequestDescriptor, RequestKey};
//!
//! let a = RequestDescriptor::new(Method::Get, "https://api.campus.edu", "/students")
//!     .with_query("dept", 5)
//!     .with_query("active", true);
//! let b = RequestDescriptor::new(Method::Get, "https://api.campus.edu", "/students")
//!     .with_query("active", true)
//!     .with_query("dept", 5);
//!
//! let key = RequestKey::canonicalize(&a);
//! assert_eq!(key, RequestKey::canonicalize(&b));
//! assert_eq!(key.as_str(), "get|https://api.campus.edu/students|active=true&dept=5");
//! ```
//!
//! ## Performance
//!
//! [`RequestKey`] stores its text in an `Arc<str>`, so cloning a key (which
//! happens on every cache write and every registry insert) only bumps a
//! reference count.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::request::{QueryParams, RequestDescriptor};

/// Canonical identity of a cacheable, deduplicable request.
///
/// Built with [`RequestKey::canonicalize`]. Equal descriptors (same method,
/// effective base endpoint, path and query parameters in any order) always
/// yield equal keys.
#[derive(Clone)]
pub struct RequestKey {
    inner: Arc<str>,
}

impl RequestKey {
    /// Derives the key of a request descriptor.
    ///
    /// Uses the effective base endpoint, so a per-call base override produces
    /// a different key than the client default.
    pub fn canonicalize(descriptor: &RequestDescriptor) -> Self {
        Self::from_parts(
            descriptor.method().as_str(),
            descriptor.base_endpoint(),
            descriptor.path(),
            descriptor.query(),
        )
    }

    /// Builds a key from its raw components.
    pub fn from_parts(method: &str, base: &str, path: &str, query: &QueryParams) -> Self {
        let params = query.canonical();
        let mut key = String::with_capacity(method.len() + base.len() + path.len() + params.len() + 2);
        push_escaped(&mut key, &method.to_ascii_lowercase());
        key.push('|');
        push_escaped(&mut key, base);
        push_escaped(&mut key, path);
        key.push('|');
        key.push_str(&params);
        Self {
            inner: Arc::from(key),
        }
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

/// Appends `part`, escaping the key's own separator.
fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        match c {
            '%' => key.push_str("%25"),
            '|' => key.push_str("%7C"),
            c => key.push(c),
        }
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestKey").field(&&*self.inner).finish()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}
