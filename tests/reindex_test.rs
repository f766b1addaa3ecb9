mod helpers;

use std::sync::Arc;

use helpers::{test_env, test_env_in, user, FakeEmbedder, TestEnv};
use mnemos::orchestrator::{NoteInput, SessionInput};
use mnemos::storage::log::LogStore;
use mnemos::types::{Message, SearchType};

async fn ingest(env: &TestEnv, id: &str, messages: Vec<Message>) {
    env.orchestrator
        .ingest_session(SessionInput {
            id: id.into(),
            messages,
            channel: None,
            user_id: None,
        })
        .await
        .unwrap();
}

/// Close the environment, delete its index files and reopen over the same root.
async fn reopen_without_index(env: TestEnv) -> TestEnv {
    env.orchestrator.close().await.unwrap();
    let index_path = env.config.index_path();
    let TestEnv { dir, .. } = env;
    for suffix in ["", "-wal", "-shm"] {
        let path = format!("{}{suffix}", index_path.display());
        let _ = std::fs::remove_file(path);
    }
    test_env_in(dir, 50, Arc::new(FakeEmbedder))
}

#[tokio::test]
async fn reindex_rebuilds_a_lost_index_from_storage() {
    let env = test_env();
    ingest(&env, "s1", vec![user("terraform state migration")]).await;
    ingest(&env, "s2", vec![user("quarterly budget review")]).await;
    let note = env
        .orchestrator
        .write(NoteInput {
            title: "Terraform".into(),
            content: "terraform state lives in s3".into(),
            tags: vec!["infra".into()],
        })
        .await
        .unwrap();
    env.orchestrator.delete("s2").await.unwrap();

    let env = reopen_without_index(env).await;
    assert!(env
        .orchestrator
        .search("terraform", None, SearchType::All)
        .await
        .unwrap()
        .is_empty());

    let mut calls = Vec::new();
    let report = env
        .orchestrator
        .reindex(|done, total| calls.push((done, total)))
        .await
        .unwrap();
    assert_eq!(report.sessions, 2);
    assert_eq!(report.notes, 1);
    assert_eq!(report.recomputed, 0);
    assert_eq!(calls.last(), Some(&(3, 3)));

    let results = env
        .orchestrator
        .search("terraform state", None, SearchType::All)
        .await
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&"s1"));
    assert!(ids.contains(&note.id.as_str()));

    let budget = env
        .orchestrator
        .search("quarterly budget review", None, SearchType::Session)
        .await
        .unwrap();
    assert!(budget.iter().all(|r| r.id != "s2"));
}

#[tokio::test]
async fn reindex_recomputes_sessions_missing_metadata() {
    let env = test_env();
    env.summarizer.set_failing(true);
    assert!(env
        .orchestrator
        .ingest_session(SessionInput {
            id: "orphan".into(),
            messages: vec![user("grafana alert thresholds")],
            channel: None,
            user_id: None,
        })
        .await
        .is_err());
    assert!(env.logs.get_meta("orphan").unwrap().is_none());

    env.summarizer.set_failing(false);
    let report = env.orchestrator.reindex(|_, _| {}).await.unwrap();
    assert_eq!(report.sessions, 1);
    assert_eq!(report.recomputed, 1);

    let meta = env.logs.get_meta("orphan").unwrap().unwrap();
    assert_eq!(meta.message_count, 1);
    let results = env
        .orchestrator
        .search("grafana alert thresholds", None, SearchType::Session)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn reindex_over_a_live_index_is_harmless() {
    let env = test_env();
    ingest(&env, "s1", vec![user("postgres vacuum tuning")]).await;
    let before = env
        .orchestrator
        .search("postgres vacuum", None, SearchType::All)
        .await
        .unwrap();

    env.orchestrator.reindex(|_, _| {}).await.unwrap();
    env.orchestrator.reindex(|_, _| {}).await.unwrap();

    let after = env
        .orchestrator
        .search("postgres vacuum", None, SearchType::All)
        .await
        .unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(after[0].id, "s1");
    assert!((after[0].score - before[0].score).abs() < 1e-9);
}
