//! Transaction log properties through the facade.

use std::collections::BTreeMap;

use dagkv::{AllMode, Database, DatabaseConfig, Entry, LogError, MemoryStore, SqliteStore, Value};
use futures::TryStreamExt;
use proptest::prelude::*;

#[tokio::test]
async fn commit_without_changes_fails() -> anyhow::Result<()> {
    let db = Database::new(SqliteStore::open_memory()?, DatabaseConfig::default());
    let log = db.empty().await?;
    assert!(matches!(log.commit().await, Err(LogError::NothingToCommit)));

    // A handle fresh from commit has nothing staged either.
    let mut log = log;
    log.set("a", 1i64);
    let log = log.commit().await?;
    assert!(matches!(log.commit().await, Err(LogError::NothingToCommit)));
    Ok(())
}

#[tokio::test]
async fn log_survives_reopening_the_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log.db");

    let root = {
        let db = Database::new(SqliteStore::open(&path)?, DatabaseConfig::default());
        let mut log = db.empty().await?;
        for i in 0..50i64 {
            log.set(format!("user/{}", i), Value::map([("id", Value::Integer(i))]));
        }
        log.commit().await?.root()
    };

    let db = Database::new(SqliteStore::open(&path)?, DatabaseConfig::default());
    let log = db.open(&root).await?;
    assert_eq!(
        log.get("user/42").await?.get("id"),
        Some(&Value::Integer(42))
    );

    let ids: Vec<(String, Entry)> = log.all(AllMode::Ids).try_collect().await?;
    assert_eq!(ids.len(), 50);
    assert!(db.verify(&root).await?.is_complete());
    Ok(())
}

#[tokio::test]
async fn dirty_handle_reports_pending_operations() -> anyhow::Result<()> {
    let db = Database::new(MemoryStore::new(), DatabaseConfig::default());
    let mut log = db.empty().await?;
    assert!(!log.is_dirty());

    log.set("a", 1i64);
    log.del("b");
    log.set("a", 2i64);
    assert!(log.is_dirty());
    assert_eq!(log.pending(), 2);

    let ids = log.pending_operation_ids();
    let committed = log.commit().await?;
    assert_eq!(committed.transaction().ops, ids);
    Ok(())
}

#[derive(Debug, Clone)]
enum Step {
    Set(String, i64),
    Del(String),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        ("[a-d]", any::<i64>()).prop_map(|(k, v)| Step::Set(k, v)),
        "[a-d]".prop_map(Step::Del),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn reads_reflect_last_write_per_key(
        rounds in prop::collection::vec(prop::collection::vec(step(), 1..8), 1..4),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Database::new(MemoryStore::new(), DatabaseConfig::default());
            let mut log = db.empty().await.unwrap();
            let mut expected: BTreeMap<String, Option<i64>> = BTreeMap::new();

            for round in &rounds {
                for step in round {
                    match step {
                        Step::Set(k, v) => {
                            log.set(k.clone(), *v);
                            expected.insert(k.clone(), Some(*v));
                        }
                        Step::Del(k) => {
                            log.del(k.clone());
                            expected.insert(k.clone(), None);
                        }
                    }
                }
                log = log.commit().await.unwrap();
            }

            for (key, value) in &expected {
                match value {
                    Some(v) => assert_eq!(log.get(key).await.unwrap(), Value::Integer(*v)),
                    None => {
                        assert!(!log.has(key).await.unwrap());
                        assert!(matches!(
                            log.get(key).await,
                            Err(LogError::NotFound { .. })
                        ));
                    }
                }
            }

            let live = expected.values().filter(|v| v.is_some()).count();
            let all: Vec<(String, Entry)> = log.all(AllMode::Values).try_collect().await.unwrap();
            assert_eq!(all.len(), live);
        });
    }
}
