//! Merge behaviour across independent databases.
//!
//! Each side owns its own store. Remote chains are made available locally
//! by replication before pulling, the way two peers would exchange them.

use std::collections::HashSet;

use dagkv::{
    BlockStore, Change, Cid, Database, DatabaseConfig, DbError, LogError, LogHandle, MemoryStore,
    Operation, SqliteStore, Transaction, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn memory_db() -> Database<MemoryStore> {
    Database::new(MemoryStore::new(), DatabaseConfig::default())
}

/// A base log `E` holding `{base: 0}`, present in two separate databases.
async fn shared_base() -> anyhow::Result<(Database<MemoryStore>, Database<MemoryStore>, Cid)> {
    let a = memory_db();
    let mut log = a.empty().await?;
    log.set("base", 0i64);
    let base = log.commit().await?.root();

    let b = memory_db();
    b.import(&**a.store(), &base).await?;
    Ok((a, b, base))
}

#[tokio::test]
async fn disjoint_forks_converge_in_either_direction() -> anyhow::Result<()> {
    init_tracing();
    let (db_a, db_b, base) = shared_base().await?;

    let mut a = db_a.open(&base).await?;
    a.set("x", 1i64);
    let a1 = a.commit().await?;

    let mut b = db_b.open(&base).await?;
    b.set("y", 2i64);
    let b1 = b.commit().await?;

    // A pulls B.
    let mut a_merge = a1.clone();
    let report = a_merge.pull(&b1).await?;
    assert_eq!(report.ancestor, base);
    assert_eq!(report.accepted, vec!["y".to_string()]);
    let a2 = a_merge.commit().await?;

    // B pulls A.
    let mut b_merge = b1.clone();
    b_merge.pull(&a1).await?;
    let b2 = b_merge.commit().await?;

    // Convergence is on log state: both merges build the same trie head.
    // The transaction ids stay apart because each commit's `prev` is the
    // side that pulled.
    assert_eq!(a2.head(), b2.head());
    assert_ne!(a2.root(), b2.root());
    assert_eq!(a2.transaction().prev, Some(a1.root()));
    assert_eq!(b2.transaction().prev, Some(b1.root()));
    for log in [&a2, &b2] {
        assert_eq!(log.get("x").await?, Value::Integer(1));
        assert_eq!(log.get("y").await?, Value::Integer(2));
        assert_eq!(log.get("base").await?, Value::Integer(0));
    }
    Ok(())
}

#[tokio::test]
async fn pulling_a_merged_chain_sees_converged_keys() -> anyhow::Result<()> {
    let (db_a, db_b, base) = shared_base().await?;

    let mut a = db_a.open(&base).await?;
    a.set("x", 1i64);
    let a1 = a.commit().await?;
    let mut b = db_b.open(&base).await?;
    b.set("y", 2i64);
    let b1 = b.commit().await?;

    let mut a_merge = a1.clone();
    a_merge.pull(&b1).await?;
    let a2 = a_merge.commit().await?;

    let mut b_merge = b1.clone();
    let report = b_merge.pull(&a2).await?;
    assert_eq!(report.converged, 1);
    assert_eq!(report.accepted, vec!["x".to_string()]);
    let b2 = b_merge.commit().await?;
    assert_eq!(b2.head(), a2.head());
    Ok(())
}

#[tokio::test]
async fn concurrent_writes_to_one_key_conflict() -> anyhow::Result<()> {
    let (db_a, db_b, base) = shared_base().await?;

    let mut a = db_a.open(&base).await?;
    a.set("k", 1i64);
    let a1 = a.commit().await?;

    let mut b = db_b.open(&base).await?;
    b.set("k", 2i64);
    let mut b1 = b.commit().await?;

    match b1.pull(&a1).await {
        Err(LogError::Conflict { key }) => assert_eq!(key, "k"),
        other => panic!("expected conflict on k, got {:?}", other),
    }
    assert_eq!(b1.pending(), 0);
    Ok(())
}

#[tokio::test]
async fn resolver_can_pick_a_winner() -> anyhow::Result<()> {
    let (db_a, db_b, base) = shared_base().await?;

    let mut a = db_a.open(&base).await?;
    a.set("k", 10i64);
    let a1 = a.commit().await?;
    let mut b = db_b.open(&base).await?;
    b.set("k", 20i64);
    let mut b1 = b.commit().await?;

    // Keep the larger value.
    let largest =
        |_key: &str, local: &[Change], remote: &[Change]| -> dagkv::log::Result<Operation> {
            let pick = |changes: &[Change]| changes[0].op.clone();
            let (l, r) = (pick(local), pick(remote));
            Ok(if l.value() >= r.value() { l } else { r })
        };
    let report = b1.pull_with(&a1, &HashSet::new(), &largest).await?;
    assert_eq!(report.resolved, vec!["k".to_string()]);
    // Value ids order arbitrarily; the staged op is one of the two.
    let staged = b1.get("k").await?;
    assert!(staged == Value::Integer(10) || staged == Value::Integer(20));
    Ok(())
}

#[tokio::test]
async fn detached_chain_has_no_common_ancestor() -> anyhow::Result<()> {
    let (db_a, _, base) = shared_base().await?;
    let mut local = db_a.open(&base).await?;

    // Same trie head as a real commit, but no `prev`.
    let other = memory_db();
    let mut scratch = other.empty().await?;
    scratch.set("stray", 1i64);
    let scratch = scratch.commit().await?;
    let detached = Transaction {
        head: scratch.head(),
        ops: scratch.transaction().ops.clone(),
        prev: None,
    }
    .to_block();
    other.store().put(&detached).await?;
    let remote = other.open(&detached.cid()).await?;

    assert!(matches!(
        local.pull(&remote).await,
        Err(LogError::NoCommonAncestor)
    ));
    Ok(())
}

#[tokio::test]
async fn known_hint_seeds_the_ancestor_search() -> anyhow::Result<()> {
    let (db_a, db_b, base) = shared_base().await?;

    let mut b = db_b.open(&base).await?;
    b.set("y", 1i64);
    let b1 = b.commit().await?;

    let mut a = db_a.open(&base).await?;
    a.pull(&b1).await?;
    let a1 = a.commit().await?;

    // B writes again; A already knows `base` is shared.
    let mut b = b1.clone();
    b.set("y", 2i64);
    let b2 = b.commit().await?;

    let mut a = a1.clone();
    let known: HashSet<Cid> = [base].into_iter().collect();
    let report = a.pull_with(&b2, &known, &dagkv::RejectConflicts).await?;
    assert_eq!(report.ancestor, base);
    // A's `y = 1` is in B's history, so B's newer write fast-forwards.
    assert_eq!(report.accepted, vec!["y".to_string()]);
    assert_eq!(a.get("y").await?, Value::Integer(2));
    Ok(())
}

#[tokio::test]
async fn peers_on_sqlite_exchange_and_merge() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let db_a = Database::new(
        SqliteStore::open(dir.path().join("a.db"))?,
        DatabaseConfig::default(),
    );
    let db_b = Database::new(
        SqliteStore::open(dir.path().join("b.db"))?,
        DatabaseConfig::default(),
    );

    let mut a = db_a.empty().await?;
    a.set("doc/1", Value::map([("title", Value::from("first"))]));
    let a1 = a.commit().await?;

    // B obtains A's log, then both sides write.
    let mut b = db_b.import(&**db_a.store(), &a1.root()).await?;
    b.set("doc/2", "second");
    let b1 = b.commit().await?;

    let mut a = a1.clone();
    a.del("doc/1");
    let a2 = a.commit().await?;

    // A fetches B's chain into its own store and merges from there.
    db_a.replicate_from(&**db_b.store(), &b1.root()).await?;
    let remote: LogHandle<SqliteStore> = db_a.open(&b1.root()).await?;
    let mut merged = a2.clone();
    merged.pull(&remote).await?;
    let merged = merged.commit().await?;

    assert!(!merged.has("doc/1").await?);
    assert_eq!(merged.get("doc/2").await?, Value::from("second"));
    assert!(db_a.verify(&merged.root()).await?.is_complete());

    // Importing an unknown root reports what is absent.
    let unknown = Cid::from_bytes([1; 32]);
    match db_b.import(&**db_a.store(), &unknown).await {
        Err(DbError::IncompleteReplica { missing, .. }) => assert_eq!(missing, 1),
        other => panic!("expected incomplete replica, got {:?}", other.map(|l| l.root())),
    }
    Ok(())
}
