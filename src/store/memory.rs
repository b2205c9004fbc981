//! In-Memory Remote Store
//!
//! Keeps documents in a mutexed map. Used by tests and by embedders
//! that want sync semantics without a network backend. A failure
//! toggle lets tests exercise the remote-unavailable paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::auth::Identity;
use crate::domain::{DomainError, DomainResult};
use super::remote::{Category, RemoteStore};

/// Remote store held entirely in memory
#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<HashMap<(String, Category), serde_json::Value>>,
    failing: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every call fails with `DomainError::Remote`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> DomainResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DomainError::Remote("remote store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    /// Direct read used by tests to assert on remote contents
    pub async fn document(
        &self,
        identity: &Identity,
        category: Category,
    ) -> Option<serde_json::Value> {
        self.documents
            .lock()
            .await
            .get(&(identity.as_str().to_string(), category))
            .cloned()
    }

    /// Direct write used by tests to seed remote contents
    pub async fn seed(&self, identity: &Identity, category: Category, body: serde_json::Value) {
        self.documents
            .lock()
            .await
            .insert((identity.as_str().to_string(), category), body);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch(
        &self,
        identity: &Identity,
        category: Category,
    ) -> DomainResult<Option<serde_json::Value>> {
        self.check_available()?;
        Ok(self.document(identity, category).await)
    }

    async fn put(
        &self,
        identity: &Identity,
        category: Category,
        body: serde_json::Value,
    ) -> DomainResult<()> {
        self.check_available()?;
        self.seed(identity, category, body).await;
        Ok(())
    }
}
