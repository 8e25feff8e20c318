#![allow(dead_code)]

use guestbook_core::{
    Entry, EntryState, InMemoryRemoteLog, LifecycleConfig, LifecycleManager, LocalId,
    RemoteId, RemoteRecord,
};
use std::sync::Arc;
use tokio::runtime::Handle;

pub fn manager(remote: &Arc<InMemoryRemoteLog>) -> LifecycleManager {
    LifecycleManager::new(remote.clone(), Handle::current())
}

pub fn manager_without_follow_up(remote: &Arc<InMemoryRemoteLog>) -> LifecycleManager {
    LifecycleManager::builder(remote.clone())
        .config(LifecycleConfig {
            reconcile_after_submit: false,
            ..LifecycleConfig::default()
        })
        .build(Handle::current())
}

pub fn seeded(remote_id: &str, author: &str, secret: &str, created_at: i64) -> RemoteRecord {
    RemoteRecord {
        remote_id: RemoteId::new(remote_id),
        author: author.to_string(),
        body: format!("message from {author}"),
        secret: secret.to_string(),
        created_at,
    }
}

/// Submits one entry and waits until the store has listed it.
pub async fn confirmed_entry(
    manager: &LifecycleManager,
    author: &str,
    body: &str,
    secret: &str,
) -> LocalId {
    let submission = manager.submit(author, body, secret).unwrap();
    let local_id = submission.local_id();
    submission.settled().await;
    let entry = manager.get(local_id).unwrap();
    assert_eq!(entry.state, EntryState::Confirmed);
    local_id
}

pub fn created_at_desc(snapshot: &[Entry]) -> bool {
    snapshot
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at)
}

/// Lets spawned tasks on the current-thread runtime run until they park.
pub async fn settle_tasks() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
