use std::time::Duration;

use chrono::Utc;

use graphmill::checkpoint::{
    checkpoint_key, decode_checkpoint, encode_checkpoint, Checkpoint, CheckpointMetadata,
    CheckpointStore, MemoryCheckpointStore, StoreConfig,
};
use graphmill::state::create_base_state;

fn checkpoint(thread_id: &str, seq: u64) -> Checkpoint {
    let mut state = create_base_state("start");
    state
        .fields
        .insert("seq".into(), serde_json::json!(seq));
    Checkpoint {
        thread_id: thread_id.to_string(),
        checkpoint_id: Checkpoint::id_for_seq(seq),
        state,
        created_at: Utc::now(),
        metadata: CheckpointMetadata {
            graph_name: "hotel_o2c".into(),
            next_node: "check_in_guest".into(),
            step: seq,
            suspension: None,
        },
    }
}

#[tokio::test]
async fn put_then_get_round_trips_state_exactly() {
    let store = MemoryCheckpointStore::default();
    let original = checkpoint("t-1", 1);
    store.put(&original).await.unwrap();

    let loaded = store.get("t-1", "00000001").await.unwrap().unwrap();
    assert_eq!(loaded.state, original.state);
    assert_eq!(loaded.metadata, original.metadata);
    assert_eq!(
        encode_checkpoint(&loaded).unwrap(),
        encode_checkpoint(&original).unwrap()
    );
}

#[tokio::test]
async fn latest_picks_greatest_timestamp_and_is_stable() {
    let store = MemoryCheckpointStore::default();
    for seq in 1..=3 {
        store.put(&checkpoint("t-1", seq)).await.unwrap();
    }

    let first = store.get_latest("t-1").await.unwrap().unwrap();
    let second = store.get_latest("t-1").await.unwrap().unwrap();
    assert_eq!(first.checkpoint_id, "00000003");
    assert_eq!(first.checkpoint_id, second.checkpoint_id);
    assert_eq!(first.state, second.state);
}

#[tokio::test]
async fn list_returns_oldest_first_per_thread() {
    let store = MemoryCheckpointStore::default();
    for seq in 1..=3 {
        store.put(&checkpoint("t-1", seq)).await.unwrap();
    }
    store.put(&checkpoint("t-2", 9)).await.unwrap();

    let ids: Vec<String> = store
        .list("t-1")
        .await
        .unwrap()
        .into_iter()
        .map(|cp| cp.checkpoint_id)
        .collect();
    assert_eq!(ids, vec!["00000001", "00000002", "00000003"]);

    assert_eq!(store.list("t-2").await.unwrap().len(), 1);
    assert!(store.list("t-3").await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn access_extends_the_ttl_when_configured() {
    let store = MemoryCheckpointStore::new(
        StoreConfig::default()
            .with_ttl(Duration::from_secs(10))
            .with_extend_on_access(true),
    );
    store.put(&checkpoint("t-1", 1)).await.unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(store.get_latest("t-1").await.unwrap().is_some());

    // 12s after the put, but only 7s after the extending read.
    tokio::time::advance(Duration::from_secs(7)).await;
    assert!(store.get_latest("t-1").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn without_extension_the_checkpoint_expires() {
    let store = MemoryCheckpointStore::new(
        StoreConfig::default()
            .with_ttl(Duration::from_secs(10))
            .with_extend_on_access(false),
    );
    store.put(&checkpoint("t-1", 1)).await.unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(store.get_latest("t-1").await.unwrap().is_some());

    tokio::time::advance(Duration::from_secs(7)).await;
    assert!(store.get_latest("t-1").await.unwrap().is_none());
    assert!(store.get("t-1", "00000001").await.unwrap().is_none());
}

#[tokio::test]
async fn namespace_shapes_the_key_layout() {
    assert_eq!(
        checkpoint_key("langgraph", "thread-9", "00000002"),
        "langgraph:checkpoint:thread-9:00000002"
    );

    let store =
        MemoryCheckpointStore::new(StoreConfig::default().with_namespace("tenant_a"));
    store.put(&checkpoint("t-1", 1)).await.unwrap();
    assert!(store.get_latest("t-1").await.unwrap().is_some());
}

#[test]
fn decode_rejects_garbage() {
    assert!(decode_checkpoint(b"not json").is_err());
}
