//! Remote Document Store
//!
//! Abstract interface to the per-user document store. Each user owns
//! one document per category; a document body is one JSON blob
//! mirroring the shape of its local counterpart.

use async_trait::async_trait;

use crate::auth::Identity;
use crate::domain::DomainResult;

/// The six independently-synced data groupings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Problems,
    Config,
    Completions,
    Retries,
    Notes,
    Activities,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Problems,
        Category::Config,
        Category::Completions,
        Category::Retries,
        Category::Notes,
        Category::Activities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Problems => "problems",
            Category::Config => "config",
            Category::Completions => "completions",
            Category::Retries => "retries",
            Category::Notes => "notes",
            Category::Activities => "activities",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user, per-category document storage.
///
/// Implementations can use HTTP, in-memory, etc. Every call is
/// independently failable; a missing document is `Ok(None)`, any
/// transport or decode failure is `DomainError::Remote`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the category document for a user, if one exists
    async fn fetch(
        &self,
        identity: &Identity,
        category: Category,
    ) -> DomainResult<Option<serde_json::Value>>;

    /// Replace the category document for a user wholesale
    async fn put(
        &self,
        identity: &Identity,
        category: Category,
        body: serde_json::Value,
    ) -> DomainResult<()>;
}
