//! Session credential state shared across the gateway, feed and poller.
//!
//! The credential is the only resource shared between components. It is read
//! by everyone, written only by the gateway's expiry-detection path and by
//! the login/logout flow, and every write is a full replace.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

/// An opaque bearer token proving an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    // Never log the token itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct SessionState {
    credential: Option<Credential>,
    expired: bool,
}

/// Explicit, clonable session context owned by the top-level controller and
/// handed to the gateway; there is no process-wide singleton.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<RwLock<SessionState>>,
    expired_tx: watch::Sender<bool>,
}

impl SessionContext {
    pub fn new() -> Self {
        let (expired_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(RwLock::new(SessionState::default())),
            expired_tx,
        }
    }

    pub fn with_credential(credential: Credential) -> Self {
        let context = Self::new();
        context.install(credential);
        context
    }

    /// Install a fresh credential, clearing any previous expiry.
    pub fn install(&self, credential: Credential) {
        {
            let mut state = self.inner.write();
            state.credential = Some(credential);
            state.expired = false;
        }
        let _ = self.expired_tx.send(false);
    }

    /// Drop the credential and mark the session expired. Used by the
    /// gateway the instant any request observes an authorization failure.
    pub fn invalidate(&self) {
        {
            let mut state = self.inner.write();
            state.credential = None;
            state.expired = true;
        }
        let _ = self.expired_tx.send(true);
    }

    /// Drop the credential without marking expiry (operator logout).
    pub fn clear(&self) {
        {
            let mut state = self.inner.write();
            state.credential = None;
            state.expired = false;
        }
        let _ = self.expired_tx.send(false);
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.read().credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().credential.is_some()
    }

    pub fn is_expired(&self) -> bool {
        self.inner.read().expired
    }

    /// Observe expiry transitions; `true` means re-authentication is
    /// required.
    pub fn subscribe_expiry(&self) -> watch::Receiver<bool> {
        self.expired_tx.subscribe()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_clears_credential_and_flags_expiry() {
        let session = SessionContext::with_credential(Credential::new("abc"));
        assert!(session.is_authenticated());
        assert!(!session.is_expired());

        session.invalidate();
        assert!(session.credential().is_none());
        assert!(session.is_expired());
    }

    #[test]
    fn install_replaces_wholesale_and_resets_expiry() {
        let session = SessionContext::new();
        session.invalidate();
        session.install(Credential::new("fresh"));
        assert_eq!(session.credential().unwrap().token(), "fresh");
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn expiry_subscription_observes_invalidation() {
        let session = SessionContext::with_credential(Credential::new("abc"));
        let mut expiry = session.subscribe_expiry();
        session.invalidate();
        expiry.changed().await.unwrap();
        assert!(*expiry.borrow());
    }
}
