//! Replicating logs between stores.

use std::collections::BTreeSet;

use dagkv::sync::ReplicationSession;
use dagkv::{
    replicate, Block, BlockStore, Cid, Database, DatabaseConfig, LogHandle, MemoryStore,
    ReplicateConfig, Replication,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn memory_db() -> Database<MemoryStore> {
    Database::new(MemoryStore::new(), DatabaseConfig::default())
}

/// A log with `commits` transactions of `per_commit` keys each.
async fn build_log(
    db: &Database<MemoryStore>,
    commits: usize,
    per_commit: usize,
) -> anyhow::Result<LogHandle<MemoryStore>> {
    let mut log = db.empty().await?;
    for c in 0..commits {
        for k in 0..per_commit {
            log.set(format!("c{}/k{}", c, k), (c * per_commit + k) as i64);
        }
        log = log.commit().await?;
    }
    Ok(log)
}

#[tokio::test]
async fn unbounded_replication_copies_every_block() -> anyhow::Result<()> {
    init_tracing();
    let origin = memory_db();
    let log = build_log(&origin, 3, 10).await?;

    let replica = MemoryStore::new();
    let outcome = replicate(&log.root(), &**origin.store(), &replica, -1, 16).await?;
    // A negative depth classifies without fetching.
    assert!(!outcome.is_complete());
    assert!(replica.is_empty());

    let outcome = replicate(&log.root(), &**origin.store(), &replica, 1024, 16).await?;
    assert!(outcome.is_complete());
    for id in origin.store().ids() {
        assert!(replica.has(&id).await?.is_some(), "{} was not copied", id);
    }
    assert_eq!(replica.len(), origin.store().len());
    Ok(())
}

#[tokio::test]
async fn depth_zero_transfers_only_the_root() -> anyhow::Result<()> {
    let origin = memory_db();
    let log = build_log(&origin, 1, 3).await?;
    let root_block: Block = origin.store().get(&log.root()).await?;
    let links: BTreeSet<Cid> = root_block.links()?.into_iter().collect();

    let replica = MemoryStore::new();
    let outcome = replicate(&log.root(), &**origin.store(), &replica, 0, 100).await?;

    assert_eq!(replica.ids(), vec![log.root()]);
    match outcome {
        Replication::Partial {
            missing,
            incomplete,
        } => {
            assert!(missing.is_empty());
            assert_eq!(incomplete, links);
        }
        Replication::Complete => panic!("depth 0 cannot complete a log"),
    }
    Ok(())
}

#[tokio::test]
async fn absent_source_block_is_reported_missing() -> anyhow::Result<()> {
    let origin = memory_db();
    let mut log = origin.empty().await?;
    let lost = log.set("lost", "gone soon");
    log.set("kept", "still here");
    let log = log.commit().await?;
    assert!(origin.store().remove(&lost));

    let replica = memory_db();
    let outcome = replica.replicate_from(&**origin.store(), &log.root()).await?;

    assert_eq!(outcome.missing_hex(), vec![lost.to_hex()]);
    assert!(outcome.incomplete_hex().is_empty());
    // Everything the source still holds arrived.
    assert_eq!(replica.store().len(), origin.store().len());

    // The log reads fine apart from the lost value.
    let opened = replica.open(&log.root()).await?;
    assert_eq!(opened.get("kept").await?, dagkv::Value::from("still here"));
    assert!(opened.get("lost").await.is_err());
    Ok(())
}

#[tokio::test]
async fn session_fetches_each_block_once() -> anyhow::Result<()> {
    let origin = memory_db();
    let v1 = build_log(&origin, 2, 5).await?;
    let mut next = v1.clone();
    next.set("extra", 1i64);
    let v2 = next.commit().await?;

    let replica = MemoryStore::new();
    let config = ReplicateConfig::default();
    let mut session = ReplicationSession::new(&**origin.store(), &replica, config);

    assert!(session.run(&v1.root()).await?.is_complete());
    let first = session.fetched();
    assert_eq!(first, replica.len());

    // Running again finds the root complete at the destination.
    assert!(session.run(&v1.root()).await?.is_complete());
    assert_eq!(session.fetched(), first);

    // The next version shares its history with v1.
    assert!(session.run(&v2.root()).await?.is_complete());
    let added = session.fetched() - first;
    assert!(added > 0 && added < first);
    assert_eq!(replica.len(), origin.store().len());
    Ok(())
}
