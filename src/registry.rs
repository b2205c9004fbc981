//! Problem Registry
//!
//! In-memory authoritative problem list for the current session,
//! derived from the catalog and the reconciliation engine. An explicit
//! context object with a session lifetime; the view layer reads it and
//! routes every mutation through it.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::auth::Identity;
use crate::domain::{
    ActivityEntry, ActivityKind, DomainError, DomainResult, Problem, ProblemDraft, ProblemPatch,
};
use crate::sync::SyncEngine;

/// Session-scoped problem list with monotonic id assignment
pub struct ProblemRegistry {
    engine: Arc<SyncEngine>,
    problems: Vec<Problem>,
    next_id: u32,
}

impl ProblemRegistry {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            problems: Vec::new(),
            next_id: 1,
        }
    }

    /// Load the session's problem list and derive the id counter
    pub fn initialize(&mut self) -> DomainResult<()> {
        self.problems = self.engine.load_problems()?;
        self.recompute_next_id()
    }

    /// `max(ids) + 1`, unless a persisted counter is present and larger
    fn recompute_next_id(&mut self) -> DomainResult<()> {
        let computed = self
            .problems
            .iter()
            .map(|p| p.id)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1);
        let persisted = self.engine.persisted_next_id()?.unwrap_or(0);
        self.next_id = computed.max(persisted);
        Ok(())
    }

    // --- Read side ---

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn get(&self, id: u32) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Completed problems, optionally restricted to the standard set
    pub fn count_completed(&self, standard_only: bool) -> DomainResult<usize> {
        let mut count = 0;
        for problem in &self.problems {
            if standard_only && !problem.is_standard {
                continue;
            }
            if self.engine.is_completed(problem.id)? {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn count_retry_marked(&self) -> DomainResult<usize> {
        let mut count = 0;
        for problem in &self.problems {
            if self.engine.is_retry(problem.id)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// All topics across the list, deduplicated and sorted
    pub fn all_topics(&self) -> Vec<String> {
        let topics: BTreeSet<String> = self
            .problems
            .iter()
            .flat_map(|p| p.topics.iter().cloned())
            .collect();
        topics.into_iter().collect()
    }

    pub fn notes(&self, id: u32) -> DomainResult<Option<String>> {
        self.engine.notes(id)
    }

    pub fn activities(&self) -> DomainResult<Vec<ActivityEntry>> {
        self.engine.activities()
    }

    // --- Problem list mutations ---

    /// Add a custom problem. Rejects duplicate titles
    /// (case-insensitive) and invalid drafts before touching any
    /// store.
    pub async fn add(&mut self, draft: ProblemDraft) -> DomainResult<Problem> {
        let title = draft.title.trim();
        if self.problems.iter().any(|p| p.title_matches(title)) {
            return Err(DomainError::Duplicate(format!(
                "problem \"{}\" is already in the list",
                title
            )));
        }

        let problem = draft.into_problem(self.next_id)?;
        self.problems.push(problem.clone());
        self.next_id += 1;

        self.engine.persist(&self.problems).await?;
        self.record(
            ActivityKind::Add,
            format!("Added new problem \"{}\"", problem.title),
        );
        Ok(problem)
    }

    /// Update a custom problem; the id is immutable and standard
    /// problems are not editable.
    pub async fn update(&mut self, id: u32, patch: ProblemPatch) -> DomainResult<Problem> {
        let index = self
            .problems
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DomainError::NotFound(format!("problem {}", id)))?;

        if self.problems[index].is_standard {
            return Err(DomainError::InvalidInput(
                "standard problems cannot be edited".to_string(),
            ));
        }

        let updated = patch.apply(&self.problems[index]);
        self.problems[index] = updated.clone();

        self.engine.persist(&self.problems).await?;
        self.record(
            ActivityKind::Edit,
            format!("Edited problem \"{}\"", updated.title),
        );
        Ok(updated)
    }

    /// Remove a custom problem. Removing a standard problem is
    /// refused with `false` and leaves the list unchanged.
    pub async fn remove(&mut self, id: u32) -> DomainResult<bool> {
        let index = self
            .problems
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DomainError::NotFound(format!("problem {}", id)))?;

        if self.problems[index].is_standard {
            log::debug!("refusing to remove standard problem {}", id);
            return Ok(false);
        }

        let removed = self.problems.remove(index);
        self.engine.persist(&self.problems).await?;
        self.record(
            ActivityKind::Delete,
            format!("Deleted problem \"{}\"", removed.title),
        );
        Ok(true)
    }

    // --- Per-problem metadata mutations ---

    pub fn set_completed(&mut self, id: u32, completed: bool) -> DomainResult<()> {
        let title = self.require(id)?.title.clone();
        self.engine.set_completed(id, completed)?;
        let text = if completed {
            format!("Completed \"{}\"", title)
        } else {
            format!("Unmarked \"{}\" as completed", title)
        };
        self.record(ActivityKind::Complete, text);
        Ok(())
    }

    /// Flip the retry marker, returning the new state
    pub fn toggle_retry(&mut self, id: u32) -> DomainResult<bool> {
        let title = self.require(id)?.title.clone();
        let marked = !self.engine.is_retry(id)?;
        self.engine.set_retry(id, marked)?;
        let text = if marked {
            format!("Marked \"{}\" for retry", title)
        } else {
            format!("Cleared retry on \"{}\"", title)
        };
        self.record(ActivityKind::Retry, text);
        Ok(marked)
    }

    pub fn save_notes(&mut self, id: u32, notes: &str) -> DomainResult<()> {
        let title = self.require(id)?.title.clone();
        self.engine.save_notes(id, notes)?;
        self.record(ActivityKind::Note, format!("Updated notes for \"{}\"", title));
        Ok(())
    }

    // --- Reconciliation triggers ---

    /// Reconcile with the remote store for this identity, then adopt
    /// the reloaded list
    pub async fn sign_in(&mut self, identity: Identity) -> DomainResult<()> {
        self.problems = self.engine.reconcile_on_sign_in(identity).await?;
        self.recompute_next_id()
    }

    /// Drop the identity and continue local-only
    pub fn sign_out(&mut self) -> DomainResult<()> {
        self.problems = self.engine.reconcile_on_sign_out()?;
        self.recompute_next_id()
    }

    /// Push-then-pull manual sync
    pub async fn sync_now(&mut self) -> DomainResult<()> {
        self.problems = self.engine.sync_now().await?;
        self.recompute_next_id()
    }

    fn require(&self, id: u32) -> DomainResult<&Problem> {
        self.get(id)
            .ok_or_else(|| DomainError::NotFound(format!("problem {}", id)))
    }

    /// Activity recording never fails a successful mutation
    fn record(&self, kind: ActivityKind, text: String) {
        if let Err(e) = self.engine.record_activity(ActivityEntry::now(kind, text)) {
            log::warn!("failed to record activity: {}", e);
        }
    }
}
