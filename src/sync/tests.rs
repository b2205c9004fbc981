//! Reconciliation Tests
//!
//! Engine and registry behavior across sign-in, sign-out, manual sync
//! and routine mutations, against an in-memory remote store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::auth::Identity;
    use crate::domain::{Difficulty, DomainError, Problem, ProblemDraft, ProblemPatch};
    use crate::registry::ProblemRegistry;
    use crate::store::{Category, LocalStore, MemoryRemoteStore, RemoteStore};
    use crate::sync::SyncEngine;

    fn standard(id: u32, title: &str) -> Problem {
        Problem {
            id,
            title: title.to_string(),
            url: format!("https://example.com/{}", id),
            topics: vec!["Array".to_string()],
            difficulty: Difficulty::Easy,
            hint: "No hint provided.".to_string(),
            is_standard: true,
        }
    }

    fn catalog() -> Vec<Problem> {
        vec![standard(1, "Two Sum"), standard(2, "Valid Anagram")]
    }

    fn draft(title: &str) -> ProblemDraft {
        ProblemDraft {
            title: title.to_string(),
            url: "https://example.com/custom".to_string(),
            topics: vec!["Graph".to_string()],
            difficulty: Difficulty::Hard,
            hint: String::new(),
        }
    }

    struct Fixture {
        engine: Arc<SyncEngine>,
        remote: Arc<MemoryRemoteStore>,
        local: Arc<LocalStore>,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(LocalStore::open_in_memory().expect("local store"));
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&local),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            catalog(),
        ));
        Fixture {
            engine,
            remote,
            local,
        }
    }

    async fn remote_problem_ids(remote: &MemoryRemoteStore, user: &Identity) -> Vec<u32> {
        let doc = remote
            .document(user, Category::Problems)
            .await
            .expect("no remote problems document");
        let problems: Vec<Problem> = serde_json::from_value(doc).expect("bad document");
        problems.iter().map(|p| p.id).collect()
    }

    // --- Load path ---

    #[tokio::test]
    async fn test_empty_local_seeds_from_catalog() {
        let fx = fixture();
        let problems = fx.engine.load_problems().expect("load failed");

        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| p.is_standard));
        // Seeded list is persisted
        let stored = fx.local.load_problem_list().unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_superset_invariant_repairs_stored_list() {
        let fx = fixture();
        // Stored list predates a catalog update: problem 2 missing
        fx.local
            .save_problem_list(&[standard(1, "Two Sum")])
            .unwrap();

        let problems = fx.engine.load_problems().expect("load failed");
        let ids: Vec<u32> = problems.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);

        // Repair is persisted immediately
        let stored = fx.local.load_problem_list().unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_load_prunes_orphaned_flags() {
        let fx = fixture();
        fx.local.set_completed(99, true).unwrap();
        fx.local.add_retry(99).unwrap();
        fx.local.set_completed(1, true).unwrap();

        fx.engine.load_problems().expect("load failed");

        assert!(!fx.local.is_completed(99).unwrap());
        assert!(!fx.local.is_retry(99).unwrap());
        assert!(fx.local.is_completed(1).unwrap());
    }

    // --- Sign-in reconciliation ---

    #[tokio::test]
    async fn test_sign_in_merges_missing_standard_into_both_sides() {
        let fx = fixture();
        let user = Identity::new("u1");
        // Remote predates the catalog update that added problem 2
        fx.remote
            .seed(
                &user,
                Category::Problems,
                serde_json::to_value(vec![standard(1, "Two Sum")]).unwrap(),
            )
            .await;

        let problems = fx
            .engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("sign-in failed");

        let ids: Vec<u32> = problems.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        // Merged list written back to the remote as well
        assert_eq!(remote_problem_ids(&fx.remote, &user).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_sign_in_adopts_remote_and_pulls_categories() {
        let fx = fixture();
        let user = Identity::new("u1");

        // Local state that the remote copy should overwrite
        fx.local.set_completed(1, false).unwrap();
        fx.local.save_notes(1, "stale local note").unwrap();

        let remote_list = vec![standard(1, "Two Sum"), standard(2, "Valid Anagram")];
        fx.remote
            .seed(
                &user,
                Category::Problems,
                serde_json::to_value(&remote_list).unwrap(),
            )
            .await;
        fx.remote
            .seed(&user, Category::Completions, json!({"1": true}))
            .await;
        fx.remote
            .seed(&user, Category::Retries, json!({"2": true}))
            .await;
        fx.remote
            .seed(&user, Category::Notes, json!({"1": "remote note"}))
            .await;
        fx.remote
            .seed(&user, Category::Config, json!({"nextId": 40}))
            .await;

        let problems = fx
            .engine
            .reconcile_on_sign_in(user)
            .await
            .expect("sign-in failed");

        assert_eq!(problems.len(), 2);
        // Remote wins at category granularity
        assert!(fx.local.is_completed(1).unwrap());
        assert!(fx.local.is_retry(2).unwrap());
        assert_eq!(fx.local.notes(1).unwrap(), Some("remote note".to_string()));
        assert_eq!(fx.local.next_id().unwrap(), Some(40));
    }

    #[tokio::test]
    async fn test_first_sign_in_pushes_entire_local_state() {
        let fx = fixture();
        let user = Identity::new("fresh");

        // Build up local-only state first
        let mut problems = catalog();
        problems.push(Problem {
            is_standard: false,
            ..standard(3, "My Custom Problem")
        });
        fx.local.save_problem_list(&problems).unwrap();
        fx.local.set_completed(1, true).unwrap();
        fx.local.save_notes(3, "my notes").unwrap();

        fx.engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("sign-in failed");

        // Local was authoritative: every category now exists remotely
        assert_eq!(remote_problem_ids(&fx.remote, &user).await, vec![1, 2, 3]);
        assert_eq!(
            fx.remote.document(&user, Category::Completions).await,
            Some(json!({"1": true}))
        );
        assert_eq!(
            fx.remote.document(&user, Category::Notes).await,
            Some(json!({"3": "my notes"}))
        );
        assert!(fx.remote.document(&user, Category::Config).await.is_some());
        assert!(fx
            .remote
            .document(&user, Category::Activities)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_idempotent_sign_in() {
        let fx = fixture();
        let user = Identity::new("u1");
        fx.remote
            .seed(
                &user,
                Category::Problems,
                serde_json::to_value(vec![standard(1, "Two Sum")]).unwrap(),
            )
            .await;

        let first = fx
            .engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("first sign-in failed");
        let second = fx
            .engine
            .reconcile_on_sign_in(user)
            .await
            .expect("second sign-in failed");

        assert_eq!(first, second);
    }

    // --- Sign-out ---

    #[tokio::test]
    async fn test_sign_out_is_local_only_and_repairs_superset() {
        let fx = fixture();
        let user = Identity::new("u1");
        fx.engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("sign-in failed");

        // Simulate a stored list that lost a standard problem
        fx.local
            .save_problem_list(&[standard(1, "Two Sum")])
            .unwrap();
        let remote_before = fx.remote.document(&user, Category::Problems).await;

        let problems = fx.engine.reconcile_on_sign_out().expect("sign-out failed");

        let ids: Vec<u32> = problems.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(fx.engine.identity().is_none());
        // No remote calls happened
        assert_eq!(
            fx.remote.document(&user, Category::Problems).await,
            remote_before
        );
    }

    // --- Manual sync ---

    #[tokio::test]
    async fn test_sync_now_converges_both_sides() {
        let fx = fixture();
        let user = Identity::new("u1");
        fx.engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("sign-in failed");

        // Local grows a custom problem while remote still has the old list
        let mut problems = catalog();
        problems.push(Problem {
            is_standard: false,
            ..standard(3, "My Custom Problem")
        });
        fx.local.save_problem_list(&problems).unwrap();

        let after = fx.engine.sync_now().await.expect("sync failed");

        let local_ids: Vec<u32> = after.iter().map(|p| p.id).collect();
        assert_eq!(local_ids, vec![1, 2, 3]);
        // Push ran before pull, so the remote ends up with the same list
        assert_eq!(remote_problem_ids(&fx.remote, &user).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sync_now_while_signed_out_is_silent() {
        let fx = fixture();
        let problems = fx.engine.sync_now().await.expect("sync failed");

        assert_eq!(problems.len(), 2);
        // Nothing was written anywhere remote
        assert!(fx
            .remote
            .document(&Identity::new("u1"), Category::Problems)
            .await
            .is_none());
    }

    // --- Mutation propagation ---

    #[tokio::test]
    async fn test_flag_mutation_mirrors_whole_category() {
        let fx = fixture();
        let user = Identity::new("u1");
        fx.engine
            .reconcile_on_sign_in(user.clone())
            .await
            .expect("sign-in failed");

        fx.engine.set_completed(1, true).unwrap();
        fx.engine.set_completed(2, false).unwrap();
        fx.engine.flush_outbox().await;

        // The whole category document is replaced, not patched
        assert_eq!(
            fx.remote.document(&user, Category::Completions).await,
            Some(json!({"1": true, "2": false}))
        );

        fx.engine.set_retry(2, true).unwrap();
        fx.engine.flush_outbox().await;
        assert_eq!(
            fx.remote.document(&user, Category::Retries).await,
            Some(json!({"2": true}))
        );
    }

    #[tokio::test]
    async fn test_mutations_stay_local_while_signed_out() {
        let fx = fixture();
        fx.engine.load_problems().unwrap();

        fx.engine.set_completed(1, true).unwrap();
        fx.engine.save_notes(1, "local note").unwrap();
        fx.engine.flush_outbox().await;

        assert!(fx.local.is_completed(1).unwrap());
        assert!(fx
            .remote
            .document(&Identity::new("u1"), Category::Completions)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_local_only() {
        let fx = fixture();
        let user = Identity::new("u1");
        fx.engine
            .reconcile_on_sign_in(user)
            .await
            .expect("sign-in failed");

        fx.remote.set_failing(true);

        // Flag mutation and list persist both still succeed
        fx.engine.set_completed(1, true).unwrap();
        let mut problems = fx.engine.load_problems().unwrap();
        problems.push(Problem {
            is_standard: false,
            ..standard(3, "Offline Custom")
        });
        fx.engine.persist(&problems).await.expect("persist failed");
        fx.engine.flush_outbox().await;

        assert!(fx.local.is_completed(1).unwrap());
        let stored = fx.local.load_problem_list().unwrap().unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_sign_in_with_unreachable_remote_keeps_local() {
        let fx = fixture();
        fx.engine.load_problems().unwrap();
        fx.local.set_completed(1, true).unwrap();
        fx.remote.set_failing(true);

        let problems = fx
            .engine
            .reconcile_on_sign_in(Identity::new("u1"))
            .await
            .expect("sign-in should degrade, not fail");

        assert_eq!(problems.len(), 2);
        assert!(fx.local.is_completed(1).unwrap());
    }

    // --- Registry ---

    async fn registry() -> (ProblemRegistry, Fixture) {
        let fx = fixture();
        let mut registry = ProblemRegistry::new(Arc::clone(&fx.engine));
        registry.initialize().expect("initialize failed");
        (registry, fx)
    }

    #[tokio::test]
    async fn test_add_assigns_monotonic_ids() {
        let (mut registry, _fx) = registry().await;
        assert_eq!(registry.next_id(), 3);

        let first = registry.add(draft("Course Schedule")).await.unwrap();
        let second = registry.add(draft("Word Ladder")).await.unwrap();

        assert_eq!(first.id, 3);
        assert_eq!(second.id, 4);
        assert!(second.id > first.id);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected_case_insensitive() {
        let (mut registry, _fx) = registry().await;

        registry.add(draft("Course Schedule")).await.unwrap();
        let result = registry.add(draft("course schedule")).await;

        assert!(matches!(result, Err(DomainError::Duplicate(_))));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let (mut registry, _fx) = registry().await;
        let result = registry.update(404, ProblemPatch::default()).await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_standard_problems_cannot_be_edited() {
        let (mut registry, _fx) = registry().await;
        let patch = ProblemPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let result = registry.update(1, patch).await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
        assert_eq!(registry.get(1).unwrap().title, "Two Sum");
    }

    #[tokio::test]
    async fn test_update_merges_patch_over_existing() {
        let (mut registry, _fx) = registry().await;
        let created = registry.add(draft("Course Schedule")).await.unwrap();

        let patch = ProblemPatch {
            difficulty: Some(Difficulty::Medium),
            ..Default::default()
        };
        let updated = registry.update(created.id, patch).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "Course Schedule");
        assert_eq!(updated.difficulty, Difficulty::Medium);
    }

    #[tokio::test]
    async fn test_remove_standard_refused_with_false() {
        let (mut registry, _fx) = registry().await;

        let removed = registry.remove(1).await.unwrap();

        assert!(!removed);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(1).is_some());
    }

    #[tokio::test]
    async fn test_remove_custom_problem() {
        let (mut registry, fx) = registry().await;
        let created = registry.add(draft("Course Schedule")).await.unwrap();

        let removed = registry.remove(created.id).await.unwrap();

        assert!(removed);
        assert_eq!(registry.len(), 2);
        // Removal is persisted
        let stored = fx.local.load_problem_list().unwrap().unwrap();
        assert_eq!(stored.len(), 2);

        let missing = registry.remove(created.id).await;
        assert!(matches!(missing, Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_counters_and_topics() {
        let (mut registry, _fx) = registry().await;
        let custom = registry.add(draft("Course Schedule")).await.unwrap();

        registry.set_completed(1, true).unwrap();
        registry.set_completed(custom.id, true).unwrap();
        registry.toggle_retry(2).unwrap();

        assert_eq!(registry.count_completed(false).unwrap(), 2);
        assert_eq!(registry.count_completed(true).unwrap(), 1);
        assert_eq!(registry.count_retry_marked().unwrap(), 1);
        assert_eq!(registry.all_topics(), vec!["Array", "Graph"]);
    }

    #[tokio::test]
    async fn test_mutations_record_activities() {
        let (mut registry, _fx) = registry().await;

        let created = registry.add(draft("Course Schedule")).await.unwrap();
        registry.set_completed(created.id, true).unwrap();
        registry.save_notes(created.id, "topological sort").unwrap();

        let log = registry.activities().unwrap();
        assert_eq!(log.len(), 3);
        // Newest first
        assert!(log[0].text.contains("notes"));
        assert!(log[2].text.contains("Added new problem"));
    }

    #[tokio::test]
    async fn test_persisted_next_id_preferred_when_larger() {
        let fx = fixture();
        fx.engine.load_problems().unwrap();
        fx.local.set_next_id(50).unwrap();

        let mut registry = ProblemRegistry::new(Arc::clone(&fx.engine));
        registry.initialize().unwrap();
        assert_eq!(registry.next_id(), 50);

        let created = registry.add(draft("Course Schedule")).await.unwrap();
        assert_eq!(created.id, 50);
    }

    #[tokio::test]
    async fn test_registry_sign_in_reloads_list_and_counter() {
        let (mut registry, fx) = registry().await;
        let user = Identity::new("u1");

        let mut remote_list = catalog();
        remote_list.push(Problem {
            is_standard: false,
            ..standard(9, "From Another Device")
        });
        fx.remote
            .seed(
                &user,
                Category::Problems,
                serde_json::to_value(&remote_list).unwrap(),
            )
            .await;

        registry.sign_in(user).await.expect("sign-in failed");

        assert_eq!(registry.len(), 3);
        assert!(registry.get(9).is_some());
        // Ids keep growing past everything seen so far
        assert_eq!(registry.next_id(), 10);
    }
}
