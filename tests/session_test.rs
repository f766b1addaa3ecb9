mod helpers;

use std::sync::Arc;

use helpers::{assistant, numbered_messages, test_env, test_env_with, user, FakeEmbedder};
use mnemos::config::ModelDimensions;
use mnemos::orchestrator::{Orchestrator, SessionInput};
use mnemos::storage::log::LogStore;
use mnemos::types::{EntryKind, Message, SearchType};
use mnemos::Error;

fn input(id: &str, messages: Vec<Message>) -> SessionInput {
    SessionInput {
        id: id.into(),
        messages,
        channel: None,
        user_id: None,
    }
}

#[tokio::test]
async fn new_session_records_counts_and_reads_back() {
    let env = test_env();
    let result = env
        .orchestrator
        .ingest_session(input("s1", vec![user("plan the deploy"), assistant("friday works")]))
        .await
        .unwrap();

    assert!(result.created);
    assert_eq!(result.message_count, 2);
    assert_eq!(result.chunk_count, 1);
    assert_eq!(result.summary, "plan the deploy friday works");
    assert_eq!(result.key_facts, vec!["plan the deploy"]);

    let meta = env.logs.get_meta("s1").unwrap().unwrap();
    assert_eq!(meta.message_count, 2);
    assert_eq!(meta.chunk_count, 1);
    assert!(!meta.deleted);

    let read = env.orchestrator.read("s1", Some(0)).await.unwrap();
    assert_eq!(read.kind, EntryKind::Session);
    assert_eq!(read.chunk_index, 0);
    assert_eq!(read.total_chunks, 1);
    let messages = read.messages.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "plan the deploy");
    assert_eq!(messages[1].content, "friday works");
}

#[tokio::test]
async fn later_ingests_append_and_grow_chunks() {
    let env = test_env();
    env.orchestrator
        .ingest_session(input("s1", numbered_messages(0, 2)))
        .await
        .unwrap();

    let result = env
        .orchestrator
        .ingest_session(input("s1", numbered_messages(2, 1)))
        .await
        .unwrap();
    assert!(!result.created);
    assert_eq!(result.message_count, 3);
    assert_eq!(result.chunk_count, 1);

    let result = env
        .orchestrator
        .ingest_session(input("s1", numbered_messages(3, 48)))
        .await
        .unwrap();
    assert_eq!(result.message_count, 51);
    assert_eq!(result.chunk_count, 2);

    let second = env.orchestrator.read("s1", Some(1)).await.unwrap();
    assert_eq!(second.total_chunks, 2);
    let messages = second.messages.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "message 50");

    let first = env.orchestrator.read("s1", None).await.unwrap();
    let messages = first.messages.unwrap();
    assert_eq!(messages.len(), 50);
    assert_eq!(messages[0].content, "message 0");
    assert_eq!(messages[49].content, "message 49");
}

#[tokio::test]
async fn chunk_past_the_end_is_rejected() {
    let env = test_env();
    env.orchestrator
        .ingest_session(input("s1", numbered_messages(0, 51)))
        .await
        .unwrap();
    assert_eq!(env.orchestrator.read("s1", Some(1)).await.unwrap().total_chunks, 2);
    for chunk in [2, 7] {
        let err = env.orchestrator.read("s1", Some(chunk)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "chunk {chunk}");
    }
}

#[tokio::test]
async fn reingest_keeps_created_at_and_advances_updated_at() {
    let env = test_env();
    env.orchestrator
        .ingest_session(input("s1", vec![user("one")]))
        .await
        .unwrap();
    let before = env.logs.get_meta("s1").unwrap().unwrap();

    env.orchestrator
        .ingest_session(input("s1", vec![user("two")]))
        .await
        .unwrap();
    let after = env.logs.get_meta("s1").unwrap().unwrap();

    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn channel_and_user_are_kept_unless_replaced() {
    let env = test_env();
    let mut first = input("s1", vec![user("hello")]);
    first.channel = Some("slack".into());
    first.user_id = Some("u1".into());
    env.orchestrator.ingest_session(first).await.unwrap();

    env.orchestrator
        .ingest_session(input("s1", vec![user("again")]))
        .await
        .unwrap();
    let meta = env.logs.get_meta("s1").unwrap().unwrap();
    assert_eq!(meta.channel.as_deref(), Some("slack"));
    assert_eq!(meta.user_id.as_deref(), Some("u1"));

    let mut third = input("s1", vec![user("moved")]);
    third.channel = Some("email".into());
    env.orchestrator.ingest_session(third).await.unwrap();
    let meta = env.logs.get_meta("s1").unwrap().unwrap();
    assert_eq!(meta.channel.as_deref(), Some("email"));
    assert_eq!(meta.user_id.as_deref(), Some("u1"));
}

#[tokio::test]
async fn new_session_without_messages_is_rejected_before_writing() {
    let env = test_env();
    let err = env
        .orchestrator
        .ingest_session(input("s1", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!env.logs.exists("s1").unwrap());
}

#[tokio::test]
async fn malformed_ids_are_rejected() {
    let env = test_env();
    for id in ["", "../escape", ".hidden", "has space", "mem_12345678"] {
        let err = env
            .orchestrator
            .ingest_session(input(id, vec![user("x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "id {id:?} should be rejected");
    }
    assert!(env.logs.list().unwrap().is_empty());
}

#[tokio::test]
async fn reading_unknown_session_is_not_found() {
    let env = test_env();
    let err = env.orchestrator.read("nope", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn summarizer_failure_leaves_log_ahead_until_next_ingest() {
    let env = test_env();
    env.orchestrator
        .ingest_session(input("s1", numbered_messages(0, 2)))
        .await
        .unwrap();

    env.summarizer.set_failing(true);
    let err = env
        .orchestrator
        .ingest_session(input("s1", numbered_messages(2, 1)))
        .await
        .unwrap_err();
    match err {
        Error::Provider { provider, .. } => assert_eq!(provider, "fake-summarizer"),
        other => panic!("expected provider error, got {other:?}"),
    }

    // the append stands, the metadata does not
    assert_eq!(env.logs.read_all("s1").unwrap().len(), 3);
    assert_eq!(env.logs.get_meta("s1").unwrap().unwrap().message_count, 2);

    env.summarizer.set_failing(false);
    let healed = env
        .orchestrator
        .ingest_session(input("s1", vec![]))
        .await
        .unwrap();
    assert!(!healed.created);
    assert_eq!(healed.message_count, 3);
    assert_eq!(env.logs.get_meta("s1").unwrap().unwrap().message_count, 3);
}

#[tokio::test]
async fn failed_first_ingest_is_recovered_by_the_next() {
    let env = test_env();
    env.summarizer.set_failing(true);
    assert!(env
        .orchestrator
        .ingest_session(input("s1", vec![user("kubernetes upgrade")]))
        .await
        .is_err());
    assert!(env.logs.exists("s1").unwrap());
    assert!(env.logs.get_meta("s1").unwrap().is_none());

    // readable straight from the log meanwhile
    let read = env.orchestrator.read("s1", None).await.unwrap();
    assert_eq!(read.messages.unwrap().len(), 1);
    assert_eq!(read.summary, "");

    let stats = env.orchestrator.stats().await.unwrap();
    assert_eq!(stats.pending_sessions, 1);

    env.summarizer.set_failing(false);
    let result = env
        .orchestrator
        .ingest_session(input("s1", vec![]))
        .await
        .unwrap();
    assert_eq!(result.message_count, 1);

    let results = env
        .orchestrator
        .search("kubernetes upgrade", None, SearchType::Session)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "s1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ingests_on_one_id_are_serialized() {
    let env = Arc::new(test_env_with(5, Arc::new(FakeEmbedder)));
    let mut handles = Vec::new();
    for i in 0..12 {
        let env = Arc::clone(&env);
        handles.push(tokio::spawn(async move {
            env.orchestrator
                .ingest_session(input("shared", vec![user(&format!("turn {i}"))]))
                .await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().created {
            created += 1;
        }
    }
    assert_eq!(created, 1, "exactly one ingest creates the session");

    let messages = env.logs.read_all("shared").unwrap();
    assert_eq!(messages.len(), 12);
    let mut contents: Vec<String> = messages.into_iter().map(|m| m.content).collect();
    contents.sort();
    contents.dedup();
    assert_eq!(contents.len(), 12);

    let meta = env.logs.get_meta("shared").unwrap().unwrap();
    assert_eq!(meta.message_count, 12);
    assert_eq!(meta.chunk_count, 3);
}

#[tokio::test]
async fn ingests_on_different_ids_do_not_interfere() {
    let env = Arc::new(test_env());
    let a = {
        let env = Arc::clone(&env);
        tokio::spawn(async move {
            env.orchestrator
                .ingest_session(input("a", numbered_messages(0, 4)))
                .await
        })
    };
    let b = {
        let env = Arc::clone(&env);
        tokio::spawn(async move {
            env.orchestrator
                .ingest_session(input("b", numbered_messages(0, 7)))
                .await
        })
    };
    assert_eq!(a.await.unwrap().unwrap().message_count, 4);
    assert_eq!(b.await.unwrap().unwrap().message_count, 7);
    assert_eq!(env.logs.list().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn storage_reads_work_without_embedding_model() {
    let env = test_env();
    env.orchestrator
        .ingest_session(input("s1", vec![user("offline read")]))
        .await
        .unwrap();
    env.orchestrator.close().await.unwrap();

    let models = tempfile::TempDir::new().unwrap();
    let mut config = env.config.clone();
    config.embedding.provider = "local".into();
    config.embedding.cache_dir = models.path().to_string_lossy().into_owned();
    assert!(Orchestrator::open(&config, &ModelDimensions::default()).is_err());

    let orchestrator = Orchestrator::open_deferred(&config, &ModelDimensions::default()).unwrap();
    let read = orchestrator.read("s1", None).await.unwrap();
    assert_eq!(read.messages.unwrap()[0].content, "offline read");
    assert_eq!(orchestrator.stats().await.unwrap().sessions, 1);

    match orchestrator.search("offline", None, SearchType::All).await {
        Err(Error::Provider { provider, .. }) => assert_eq!(provider, "local"),
        other => panic!("expected provider error, got {other:?}"),
    }
}
