//! Concurrent claimers against a shared work queue.
//!
//! The PostgreSQL variant runs only when `ROUGE_TEST_DATABASE_URL` points at
//! a disposable database.

use std::collections::HashSet;
use std::sync::Arc;

use rouge::queue::{ItemStatus, PgQueue, SqliteQueue, WorkQueue, WorkerId};

fn worker(id: &str) -> WorkerId {
    id.parse().unwrap()
}

/// Spawn `claimers` tasks that each claim once for `worker`, and collect the claimed ids.
async fn race(queue: Arc<dyn WorkQueue>, worker: &WorkerId, claimers: usize) -> Vec<i64> {
    let mut handles = Vec::new();
    for _ in 0..claimers {
        let queue = queue.clone();
        let worker = worker.clone();
        handles.push(tokio::spawn(async move { queue.claim_next(&worker).await }));
    }
    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(item) = handle.await.unwrap().unwrap() {
            claimed.push(item.item_id);
        }
    }
    claimed
}

async fn sqlite_queue(dir: &tempfile::TempDir) -> Arc<dyn WorkQueue> {
    Arc::new(SqliteQueue::open(&dir.path().join("rouge.db")).await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_item_is_claimed_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&dir).await;
    let w = worker("hailmary-2");
    let item = queue.enqueue("One issue", Some(&w), ItemStatus::Pending).await.unwrap();

    let claimed = race(queue.clone(), &w, 8).await;

    assert_eq!(claimed, vec![item.item_id]);
    let stored = queue.get_item(item.item_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ItemStatus::Started);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_share_an_item() {
    let dir = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&dir).await;
    let w = worker("xwing-1");
    for n in 0..5 {
        queue.enqueue(&format!("Issue {n}"), Some(&w), ItemStatus::Pending).await.unwrap();
    }

    let claimed = race(queue.clone(), &w, 10).await;

    assert_eq!(claimed.len(), 5);
    let unique: HashSet<i64> = claimed.iter().copied().collect();
    assert_eq!(unique.len(), 5);
    assert!(queue.claim_next(&w).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claimers_only_see_their_own_items() {
    let dir = tempfile::tempdir().unwrap();
    let queue = sqlite_queue(&dir).await;
    let mine = worker("tydirium-1");
    let theirs = worker("tydirium-2");
    let patch = queue.enqueue("Patch for mine", Some(&mine), ItemStatus::PatchPending).await.unwrap();
    queue.enqueue("Someone else's", Some(&theirs), ItemStatus::Pending).await.unwrap();
    queue.enqueue("Unassigned", None, ItemStatus::Pending).await.unwrap();

    let claimed = race(queue.clone(), &mine, 4).await;

    assert_eq!(claimed, vec![patch.item_id]);
    let other = queue.claim_next(&theirs).await.unwrap().unwrap();
    assert_eq!(other.prior_status, ItemStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_claims_are_exclusive() {
    let Ok(url) = std::env::var("ROUGE_TEST_DATABASE_URL") else {
        eprintln!("ROUGE_TEST_DATABASE_URL not set, skipping");
        return;
    };
    let queue = Arc::new(PgQueue::connect(&url).await.unwrap());
    let w = worker("executor-3");

    // Drain leftovers from earlier runs.
    while queue.claim_next(&w).await.unwrap().is_some() {}

    let mut ids = HashSet::new();
    for n in 0..4 {
        let item = queue.enqueue(&format!("pg issue {n}"), Some(&w), ItemStatus::Pending).await.unwrap();
        ids.insert(item.item_id);
    }

    let claimed = race(queue.clone(), &w, 8).await;

    let unique: HashSet<i64> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 4);
    assert_eq!(unique, ids);
}
