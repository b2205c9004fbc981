//! Authentication Boundary
//!
//! The popup/token flow itself lives outside this crate; only the
//! success/failure signal and the identity-change feed matter here.
//! The sync engine subscribes to the feed rather than to the sign-in
//! call, so it reacts the same way whether identity changes through an
//! explicit action or an external cause.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::{DomainError, DomainResult};

/// Opaque id of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// External authentication collaborator
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Run the sign-in flow, returning the authenticated identity
    async fn sign_in(&self) -> DomainResult<Identity>;

    /// Sign the current user out
    async fn sign_out(&self) -> DomainResult<()>;

    /// The currently authenticated identity, if any
    fn current_identity(&self) -> Option<Identity>;

    /// Identity-change feed; receivers see every sign-in and sign-out
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// In-process auth provider over a watch channel.
///
/// Used by tests and by embedders that resolve identity elsewhere and
/// only need the feed semantics.
pub struct StaticAuthProvider {
    identity: watch::Sender<Option<Identity>>,
    next_identity: std::sync::Mutex<Option<Identity>>,
}

impl StaticAuthProvider {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            identity: tx,
            next_identity: std::sync::Mutex::new(None),
        }
    }

    /// Set the identity the next `sign_in` call will resolve to
    pub fn set_next_identity(&self, identity: Identity) {
        if let Ok(mut next) = self.next_identity.lock() {
            *next = Some(identity);
        }
    }

    /// Push an identity change from outside the sign-in/out calls,
    /// e.g. a session expiring or another device taking over.
    pub fn force_identity(&self, identity: Option<Identity>) {
        let _ = self.identity.send(identity);
    }
}

impl Default for StaticAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn sign_in(&self) -> DomainResult<Identity> {
        let identity = self
            .next_identity
            .lock()
            .ok()
            .and_then(|next| next.clone())
            .ok_or_else(|| DomainError::InvalidInput("no identity configured".to_string()))?;

        let _ = self.identity.send(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> DomainResult<()> {
        let _ = self.identity.send(None);
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
