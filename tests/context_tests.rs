//! Execution context cache tests.
//!
//! Exercises the per-cluster slot locking of `ContextManager` against the
//! scripted control plane.


use std::sync::Arc;
use std::time::Duration;

use remote_exec::context::ContextManager;
use remote_exec::error::OrchestratorError;
use remote_exec::remote::Language;
use test_harness::{remote_error, FakeControlPlane};

#[tokio::test]
async fn test_get_or_create_reuses_cached_context() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    let first = contexts.get_or_create("c1", Language::Python).await.unwrap();
    let second = contexts.get_or_create("c1", Language::Python).await.unwrap();

    assert_eq!(first.context_id, "ctx-1");
    assert_eq!(second.context_id, first.context_id);
    assert_eq!(fake.creates(), 1);
}

#[tokio::test]
async fn test_context_reused_across_languages() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    let python = contexts.get_or_create("c1", Language::Python).await.unwrap();
    let sql = contexts.get_or_create("c1", Language::Sql).await.unwrap();

    assert_eq!(sql.context_id, python.context_id);
    assert_eq!(sql.language, Language::Python);
    assert_eq!(fake.creates(), 1);
}

#[tokio::test]
async fn test_concurrent_first_use_creates_one_context() {
    let fake = FakeControlPlane::new().with_create_delay(Duration::from_millis(50));
    let contexts = Arc::new(ContextManager::new(fake.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let contexts = contexts.clone();
        handles.push(tokio::spawn(async move {
            contexts.get_or_create("c1", Language::Python).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().context_id);
    }

    assert_eq!(fake.creates(), 1, "exactly one remote create");
    assert!(ids.iter().all(|id| id == "ctx-1"));
}

#[tokio::test]
async fn test_different_clusters_get_independent_contexts() {
    let fake = FakeControlPlane::new().with_create_delay(Duration::from_millis(20));
    let contexts = Arc::new(ContextManager::new(fake.clone()));

    let (a, b) = tokio::join!(
        contexts.get_or_create("c1", Language::Python),
        contexts.get_or_create("c2", Language::Python),
    );

    assert_ne!(a.unwrap().context_id, b.unwrap().context_id);
    assert_eq!(fake.creates(), 2);
    assert_eq!(contexts.snapshot().await.len(), 2);
}

#[tokio::test]
async fn test_destroy_without_cached_context_is_noop() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    assert!(!contexts.destroy("c1").await.unwrap());
    assert_eq!(fake.destroys(), 0, "no remote call");
}

#[tokio::test]
async fn test_destroy_removes_entry_and_next_use_creates() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    assert!(contexts.destroy("c1").await.unwrap());
    assert_eq!(fake.destroys(), 1);
    assert!(contexts.cached("c1").await.is_none());

    let next = contexts.get_or_create("c1", Language::Python).await.unwrap();
    assert_eq!(next.context_id, "ctx-2");
}

#[tokio::test]
async fn test_destroy_treats_missing_remote_context_as_success() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());
    fake.push_destroy(Err(remote_error(404, "context not found")));

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    assert!(contexts.destroy("c1").await.unwrap());
    assert!(contexts.cached("c1").await.is_none());
}

#[tokio::test]
async fn test_destroy_failure_still_forgets_context() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());
    fake.push_destroy(Err(remote_error(500, "internal error")));

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    let err = contexts.destroy("c1").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::RemoteApi { status: 500, .. }));
    assert!(contexts.cached("c1").await.is_none());
}

#[tokio::test]
async fn test_invalidate_makes_no_remote_call() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    let removed = contexts.invalidate("c1").await.unwrap();

    assert_eq!(removed.context_id, "ctx-1");
    assert_eq!(fake.destroys(), 0);
    assert!(contexts.invalidate("c1").await.is_none());
}

#[tokio::test]
async fn test_recreate_if_stale_replaces_stale_context() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    let fresh = contexts
        .recreate_if_stale("c1", "ctx-1", Language::Python)
        .await
        .unwrap();

    assert_eq!(fresh.context_id, "ctx-2");
    assert_eq!(contexts.cached("c1").await.unwrap().context_id, "ctx-2");
}

#[tokio::test]
async fn test_recreate_if_stale_creates_when_nothing_cached() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    let fresh = contexts
        .recreate_if_stale("c1", "ctx-old", Language::Python)
        .await
        .unwrap();

    assert_eq!(fresh.context_id, "ctx-1");
    assert_eq!(fake.creates(), 1);
}

#[tokio::test]
async fn test_recreate_if_stale_keeps_already_replaced_context() {
    let fake = FakeControlPlane::new();
    let contexts = ContextManager::new(fake.clone());

    contexts.get_or_create("c1", Language::Python).await.unwrap();
    contexts
        .recreate_if_stale("c1", "ctx-1", Language::Python)
        .await
        .unwrap();

    // A second caller that also saw ctx-1 gets the replacement, not a third context.
    let current = contexts
        .recreate_if_stale("c1", "ctx-1", Language::Python)
        .await
        .unwrap();

    assert_eq!(current.context_id, "ctx-2");
    assert_eq!(fake.creates(), 2);
}

#[tokio::test]
async fn test_concurrent_recovery_of_same_stale_context_creates_once() {
    let fake = FakeControlPlane::new().with_create_delay(Duration::from_millis(20));
    let contexts = Arc::new(ContextManager::new(fake.clone()));
    contexts.get_or_create("c1", Language::Python).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let contexts = contexts.clone();
        handles.push(tokio::spawn(async move {
            contexts
                .recreate_if_stale("c1", "ctx-1", Language::Python)
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().context_id, "ctx-2");
    }

    assert_eq!(fake.creates(), 2, "warm-up plus exactly one replacement");
    assert_eq!(contexts.cached("c1").await.unwrap().context_id, "ctx-2");
}
