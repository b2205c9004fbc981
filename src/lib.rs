//! Prep-Track Backend
//!
//! Local-first tracker for coding-practice problems with optional
//! cross-device sync. Layered architecture:
//! - domain: Core entities and business rules
//! - store: Local key-value store and remote document store
//! - catalog: Standard problem set loading
//! - auth: Authentication boundary
//! - sync: Local/remote reconciliation engine
//! - registry: Session problem list exposed to the view layer

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod auth;
pub mod catalog;
pub mod domain;
pub mod registry;
pub mod store;
pub mod sync;

use auth::AuthProvider;
use domain::{DomainResult, Problem};
use registry::ProblemRegistry;
use store::{HttpRemoteStore, LocalStore, MemoryRemoteStore, RemoteStore};
use sync::SyncEngine;

/// Where the standard catalog is fetched from
pub enum CatalogSource {
    Path(PathBuf),
    Url(String),
    /// Catalog provided by the embedder, already loaded
    Inline(Vec<Problem>),
}

/// Which remote document store backs sync
pub enum RemoteBackend {
    Http {
        base_url: String,
        token: Option<String>,
    },
    /// In-process store, useful for tests and offline profiles
    Memory,
}

/// Session configuration
pub struct AppConfig {
    /// Local database path; `None` keeps the session in memory
    pub local_db: Option<PathBuf>,
    pub catalog: CatalogSource,
    pub remote: RemoteBackend,
}

/// Application state for one session.
///
/// An explicit context object rather than process-wide globals: built
/// at session start, dropped at session end.
pub struct AppState {
    engine: Arc<SyncEngine>,
    registry: Arc<Mutex<ProblemRegistry>>,
    auth: Arc<dyn AuthProvider>,
}

impl AppState {
    /// Build and initialize a session from configuration
    pub async fn initialize(
        config: AppConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> DomainResult<Self> {
        let local = match &config.local_db {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::open_in_memory()?,
        };

        let catalog = match config.catalog {
            CatalogSource::Path(path) => catalog::load_from_path(&path),
            CatalogSource::Url(url) => catalog::load_from_url(&url).await,
            CatalogSource::Inline(mut problems) => {
                for problem in &mut problems {
                    problem.is_standard = true;
                }
                problems
            }
        };

        let remote: Arc<dyn RemoteStore> = match config.remote {
            RemoteBackend::Http { base_url, token } => match token {
                Some(token) => Arc::new(HttpRemoteStore::with_token(base_url, token)),
                None => Arc::new(HttpRemoteStore::new(base_url)),
            },
            RemoteBackend::Memory => Arc::new(MemoryRemoteStore::new()),
        };

        Self::with_stores(Arc::new(local), remote, auth, catalog)
    }

    /// Wire a session from already-constructed collaborators
    pub fn with_stores(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        catalog: Vec<Problem>,
    ) -> DomainResult<Self> {
        let engine = Arc::new(SyncEngine::new(local, remote, catalog));
        let mut registry = ProblemRegistry::new(Arc::clone(&engine));
        registry.initialize()?;

        Ok(Self {
            engine,
            registry: Arc::new(Mutex::new(registry)),
            auth,
        })
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn registry(&self) -> Arc<Mutex<ProblemRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn auth(&self) -> Arc<dyn AuthProvider> {
        Arc::clone(&self.auth)
    }

    /// React to the identity feed: reconcile and reload the registry
    /// whenever the authenticated identity changes, whatever caused
    /// the change.
    pub fn watch_identity(&self) -> tokio::task::JoinHandle<()> {
        let mut feed = self.auth.subscribe();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            while feed.changed().await.is_ok() {
                let identity = feed.borrow_and_update().clone();
                let mut registry = registry.lock().await;
                let result = match identity {
                    Some(identity) => registry.sign_in(identity).await,
                    None => registry.sign_out(),
                };
                if let Err(e) = result {
                    log::error!("identity change reconciliation failed: {}", e);
                }
            }
        })
    }
}
