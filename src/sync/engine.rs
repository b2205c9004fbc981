//! Reconciliation Engine
//!
//! Keeps six independently-stored categories (problems, config,
//! completions, retries, notes, activities) consistent between the
//! local store and the remote store while a user is signed in, and
//! keeps the problem list self-consistent (standard catalog always
//! present) while no one is.
//!
//! All durable state lives in the stores; the engine only holds the
//! current identity. Every remote call is independently caught: a
//! failure degrades that category to local-only and never blocks or
//! rolls back another category.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::auth::Identity;
use crate::domain::{ActivityEntry, DomainResult, Problem};
use crate::store::{Category, LocalStore, RemoteStore};
use super::outbox::RemoteOutbox;

/// The local/remote reconciliation core
pub struct SyncEngine {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    catalog: Vec<Problem>,
    identity: std::sync::Mutex<Option<Identity>>,
    outbox: RemoteOutbox,
}

impl SyncEngine {
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        catalog: Vec<Problem>,
    ) -> Self {
        let outbox = RemoteOutbox::spawn(Arc::clone(&remote));
        Self {
            local,
            remote,
            catalog,
            identity: std::sync::Mutex::new(None),
            outbox,
        }
    }

    /// The standard catalog cached for this session
    pub fn catalog(&self) -> &[Problem] {
        &self.catalog
    }

    /// The identity gating remote operations, if any
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_identity(&self, identity: Option<Identity>) {
        if let Ok(mut guard) = self.identity.lock() {
            *guard = identity;
        }
    }

    // --- Load path ---

    /// Produce the session's problem list from the local store.
    ///
    /// Falls back to the catalog when nothing is stored, appends any
    /// standard problem missing from a stored list (never removes),
    /// persists the corrected list, and prunes flags whose problem no
    /// longer exists.
    pub fn load_problems(&self) -> DomainResult<Vec<Problem>> {
        let stored = self.local.load_problem_list()?.unwrap_or_default();

        let problems = if stored.is_empty() {
            let seeded = self.catalog.clone();
            if !seeded.is_empty() {
                self.local.save_problem_list(&seeded)?;
            }
            seeded
        } else {
            let (merged, changed) = merge_missing_standard(stored, &self.catalog);
            if changed {
                self.local.save_problem_list(&merged)?;
            }
            merged
        };

        let ids: Vec<u32> = problems.iter().map(|p| p.id).collect();
        self.local.prune_orphan_flags(&ids)?;
        Ok(problems)
    }

    // --- Mutation propagation ---

    /// Write the full problem list locally, then mirror it to the
    /// remote store when signed in. The local write is the durability
    /// backbone: a remote failure is logged and never reaches the
    /// caller.
    pub async fn persist(&self, problems: &[Problem]) -> DomainResult<()> {
        self.local.save_problem_list(problems)?;

        if let Some(identity) = self.identity() {
            for category in [Category::Problems, Category::Config] {
                if let Err(e) = self.push_category(&identity, category).await {
                    log::warn!("remote mirror of {} failed: {}", category, e);
                }
            }
        }
        Ok(())
    }

    /// Set a completion flag, mirroring the whole category when signed in
    pub fn set_completed(&self, id: u32, completed: bool) -> DomainResult<()> {
        self.local.set_completed(id, completed)?;
        self.mirror_category(Category::Completions)?;
        Ok(())
    }

    /// Set or clear a retry marker, mirroring the whole category when
    /// signed in
    pub fn set_retry(&self, id: u32, marked: bool) -> DomainResult<()> {
        if marked {
            self.local.add_retry(id)?;
        } else {
            self.local.remove_retry(id)?;
        }
        self.mirror_category(Category::Retries)?;
        Ok(())
    }

    /// Save a note, mirroring the whole category when signed in
    pub fn save_notes(&self, id: u32, notes: &str) -> DomainResult<()> {
        self.local.save_notes(id, notes)?;
        self.mirror_category(Category::Notes)?;
        Ok(())
    }

    /// Record an activity entry, mirroring the log when signed in
    pub fn record_activity(&self, entry: ActivityEntry) -> DomainResult<()> {
        self.local.push_activity(entry)?;
        self.mirror_category(Category::Activities)?;
        Ok(())
    }

    // --- Read-side passthroughs over local state ---

    pub fn is_completed(&self, id: u32) -> DomainResult<bool> {
        self.local.is_completed(id)
    }

    pub fn is_retry(&self, id: u32) -> DomainResult<bool> {
        self.local.is_retry(id)
    }

    pub fn notes(&self, id: u32) -> DomainResult<Option<String>> {
        self.local.notes(id)
    }

    pub fn activities(&self) -> DomainResult<Vec<ActivityEntry>> {
        self.local.activities()
    }

    pub fn persisted_next_id(&self) -> DomainResult<Option<u32>> {
        self.local.next_id()
    }

    /// Rebuild a category document from local state and queue a
    /// wholesale overwrite of the remote copy. Fire-and-forget: the
    /// outbox worker serializes writes per document and logs failures.
    fn mirror_category(&self, category: Category) -> DomainResult<()> {
        let identity = match self.identity() {
            Some(identity) => identity,
            None => return Ok(()),
        };
        let body = self.build_category_document(category)?;
        self.outbox.enqueue(identity, category, body);
        Ok(())
    }

    /// Wait for queued fire-and-forget writes to be attempted
    pub async fn flush_outbox(&self) {
        self.outbox.flush().await;
    }

    // --- Sign-in / sign-out / manual sync ---

    /// Reconcile on sign-in and return the reloaded problem list.
    ///
    /// A remote holding problems is the authoritative base; standard
    /// problems missing from it are appended and the repaired list is
    /// written back to both sides. A remote with no problem list yet
    /// receives the entire local state instead.
    pub async fn reconcile_on_sign_in(&self, identity: Identity) -> DomainResult<Vec<Problem>> {
        self.set_identity(Some(identity.clone()));
        log::info!("reconciling after sign-in of {}", identity);

        let remote_problems = match self.remote.fetch(&identity, Category::Problems).await {
            Ok(doc) => doc.map(decode_problem_list).unwrap_or_default(),
            Err(e) => {
                log::warn!("remote problems unavailable on sign-in: {}", e);
                Vec::new()
            }
        };

        if remote_problems.is_empty() {
            // First sync for this identity: local is authoritative.
            // Settle the local list first so the push carries the
            // seeded/repaired state.
            let problems = self.load_problems()?;
            for category in Category::ALL {
                if let Err(e) = self.push_category(&identity, category).await {
                    log::warn!("initial push of {} failed: {}", category, e);
                }
            }
            return Ok(problems);
        }

        let (merged, repaired) = merge_missing_standard(remote_problems, &self.catalog);
        self.local.save_problem_list(&merged)?;
        if repaired {
            // The remote predates a catalog update; repair it too.
            if let Err(e) = self.push_category(&identity, Category::Problems).await {
                log::warn!("remote catalog repair failed: {}", e);
            }
        }

        for category in [
            Category::Config,
            Category::Completions,
            Category::Retries,
            Category::Notes,
            Category::Activities,
        ] {
            if let Err(e) = self.pull_category(&identity, category).await {
                log::warn!("pull of {} failed, keeping local copy: {}", category, e);
            }
        }

        self.load_problems()
    }

    /// Clear the identity and repair the local list. No remote calls.
    pub fn reconcile_on_sign_out(&self) -> DomainResult<Vec<Problem>> {
        self.set_identity(None);
        log::info!("signed out, continuing local-only");
        self.load_problems()
    }

    /// Manual sync: push all categories, then pull them, in that
    /// fixed order, so the session ends with local reflecting the
    /// merged state of both sides. Local-only (and silently
    /// successful) while signed out.
    pub async fn sync_now(&self) -> DomainResult<Vec<Problem>> {
        let identity = match self.identity() {
            Some(identity) => identity,
            None => return self.load_problems(),
        };

        for category in Category::ALL {
            if let Err(e) = self.push_category(&identity, category).await {
                log::warn!("push of {} failed: {}", category, e);
            }
        }
        for category in Category::ALL {
            if let Err(e) = self.pull_category(&identity, category).await {
                log::warn!("pull of {} failed, keeping local copy: {}", category, e);
            }
        }

        self.load_problems()
    }

    // --- Category push/pull ---

    fn known_ids(&self) -> DomainResult<Vec<u32>> {
        Ok(self
            .local
            .load_problem_list()?
            .unwrap_or_default()
            .iter()
            .map(|p| p.id)
            .collect())
    }

    fn build_category_document(&self, category: Category) -> DomainResult<serde_json::Value> {
        let body = match category {
            Category::Problems => {
                let problems = self.local.load_problem_list()?.unwrap_or_default();
                serde_json::to_value(problems)
            }
            Category::Config => {
                let next_id = self.local.next_id()?.unwrap_or(1);
                Ok(serde_json::json!({ "nextId": next_id }))
            }
            Category::Completions => {
                let map = self.local.completion_map(&self.known_ids()?)?;
                serde_json::to_value(stringify_keys(map))
            }
            Category::Retries => {
                let marked = self.local.retry_set(&self.known_ids()?)?;
                let map: BTreeMap<String, bool> =
                    marked.into_iter().map(|id| (id.to_string(), true)).collect();
                serde_json::to_value(map)
            }
            Category::Notes => {
                let map = self.local.notes_map(&self.known_ids()?)?;
                serde_json::to_value(stringify_keys(map))
            }
            Category::Activities => serde_json::to_value(self.local.activities()?),
        };
        body.map_err(|e| crate::domain::DomainError::Storage(e.to_string()))
    }

    /// Local -> remote for one category, a full document replace
    async fn push_category(&self, identity: &Identity, category: Category) -> DomainResult<()> {
        let body = self.build_category_document(category)?;
        self.remote.put(identity, category, body).await
    }

    /// Remote -> local for one category. A missing remote document
    /// leaves local untouched; an existing one overwrites local state
    /// for that category (problems get the standard-merge treatment
    /// instead of a blind overwrite).
    async fn pull_category(&self, identity: &Identity, category: Category) -> DomainResult<()> {
        let doc = match self.remote.fetch(identity, category).await? {
            Some(doc) => doc,
            None => return Ok(()),
        };

        match category {
            Category::Problems => {
                let remote_problems = decode_problem_list(doc);
                if !remote_problems.is_empty() {
                    let (merged, repaired) = merge_missing_standard(remote_problems, &self.catalog);
                    self.local.save_problem_list(&merged)?;
                    if repaired {
                        if let Err(e) = self.push_category(identity, Category::Problems).await {
                            log::warn!("remote catalog repair failed: {}", e);
                        }
                    }
                }
            }
            Category::Config => {
                if let Some(next_id) = doc.get("nextId").and_then(|v| v.as_u64()) {
                    self.local.set_next_id(next_id as u32)?;
                }
            }
            Category::Completions => {
                let map: BTreeMap<String, bool> =
                    serde_json::from_value(doc).unwrap_or_default();
                self.local.apply_completion_map(&parse_keys(map))?;
            }
            Category::Retries => {
                let map: BTreeMap<String, bool> =
                    serde_json::from_value(doc).unwrap_or_default();
                let marked: Vec<u32> = map
                    .into_iter()
                    .filter(|(_, v)| *v)
                    .filter_map(|(k, _)| k.parse().ok())
                    .collect();
                self.local.apply_retry_set(&self.known_ids()?, &marked)?;
            }
            Category::Notes => {
                let map: BTreeMap<String, String> =
                    serde_json::from_value(doc).unwrap_or_default();
                self.local.apply_notes_map(&parse_keys(map))?;
            }
            Category::Activities => {
                let mut log_entries: Vec<ActivityEntry> =
                    serde_json::from_value(doc).unwrap_or_default();
                log_entries.truncate(crate::domain::MAX_ACTIVITIES);
                self.local.set_activities(&log_entries)?;
            }
        }
        Ok(())
    }
}

/// Append standard-catalog problems missing from the list, preserving
/// order. Returns the merged list and whether anything was appended.
fn merge_missing_standard(
    mut problems: Vec<Problem>,
    catalog: &[Problem],
) -> (Vec<Problem>, bool) {
    let present: HashSet<u32> = problems.iter().map(|p| p.id).collect();
    let mut changed = false;
    for standard in catalog {
        if !present.contains(&standard.id) {
            problems.push(standard.clone());
            changed = true;
        }
    }
    (problems, changed)
}

fn decode_problem_list(doc: serde_json::Value) -> Vec<Problem> {
    serde_json::from_value(doc).unwrap_or_else(|e| {
        log::warn!("ignoring malformed remote problem list: {}", e);
        Vec::new()
    })
}

fn stringify_keys<V>(map: BTreeMap<u32, V>) -> BTreeMap<String, V> {
    map.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn parse_keys<V>(map: BTreeMap<String, V>) -> BTreeMap<u32, V> {
    map.into_iter()
        .filter_map(|(k, v)| k.parse().ok().map(|k| (k, v)))
        .collect()
}
