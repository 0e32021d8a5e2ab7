//! Session credential and the hooks fired when it is revoked.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use gatehouse_core::OutgoingRequest;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use smol_str::SmolStr;
use tracing::{debug, warn};

/// Collaborator notified when the server rejects the session.
///
/// Both hooks are fire-and-forget: the client ignores what they do and
/// never waits on them.
pub trait SessionHooks: Send + Sync {
    /// Forget any session state persisted outside the client.
    fn clear_persisted_session(&self);

    /// Send the user to the login entry point.
    fn navigate_to_login(&self);
}

impl<T> SessionHooks for std::sync::Arc<T>
where
    T: SessionHooks + ?Sized,
{
    fn clear_persisted_session(&self) {
        self.as_ref().clear_persisted_session()
    }

    fn navigate_to_login(&self) {
        self.as_ref().navigate_to_login()
    }
}

/// Hooks that do nothing. Useful for headless clients and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionHooks;

impl SessionHooks for NoopSessionHooks {
    fn clear_persisted_session(&self) {}

    fn navigate_to_login(&self) {}
}

/// The bearer credential of the single logged-in user.
///
/// One instance per client. Populated at login, read on every outgoing
/// request, cleared when the server answers 401.
///
/// Every [`store`](Self::store) and [`clear`](Self::clear) starts a new
/// [`generation`](Self::generation). Responses fetched under an older
/// generation belong to a previous session.
pub struct SessionCredential {
    token: RwLock<Option<String>>,
    generation: AtomicU64,
    scheme: SmolStr,
}

impl SessionCredential {
    /// Creates an empty credential that renders as `{scheme} {token}`.
    pub fn new(scheme: impl Into<SmolStr>) -> Self {
        Self {
            token: RwLock::new(None),
            generation: AtomicU64::new(0),
            scheme: scheme.into(),
        }
    }

    /// Stores the token obtained at login.
    pub fn store(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token.into());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Forgets the token. Returns the previous one, if any.
    pub fn clear(&self) -> Option<String> {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        guard.take()
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns a copy of the current token.
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a token is present.
    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Sets the `Authorization` header if a token is present.
    ///
    /// Without a token the request is left untouched; anonymous calls are
    /// valid. A token that cannot be rendered as a header value is skipped
    /// with a warning rather than failing the call.
    pub fn attach(&self, request: &mut OutgoingRequest) {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        let Some(token) = guard.as_deref() else {
            return;
        };
        match HeaderValue::try_from(format!("{} {}", self.scheme, token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.insert_header(AUTHORIZATION, value);
                debug!("attached session credential");
            }
            Err(_) => warn!("session token is not a valid header value; sending anonymously"),
        }
    }
}

impl Default for SessionCredential {
    fn default() -> Self {
        Self::new("Bearer")
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("scheme", &self.scheme)
            .field("authenticated", &self.is_authenticated())
            .field("generation", &self.generation())
            .finish()
    }
}
