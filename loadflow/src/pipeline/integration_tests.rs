//! End-to-end tests for the provided pipeline shapes.

use super::{BuiltPipeline, LoadPipelineBuilder, STEP_ACCUMULATE, STEP_LOAD};
use crate::config::LoadPipelineConfig;
use crate::core::{BatchState, CheckpointId, DestinationRecord};
use crate::state::CheckpointTracker;
use crate::task::TaskLauncher;
use crate::testing::{record, records, stream, FailingSink, RecordingLoaderFactory, RecordingSink, TestCatalog};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Starts the pipeline and a tracker draining its updates.
fn start(built: &mut BuiltPipeline) -> (TaskLauncher, Arc<CheckpointTracker>, JoinHandle<()>) {
    let tracker = Arc::new(built.checkpoint_tracker());
    let (_, placeholder) = tokio::sync::mpsc::channel(1);
    let updates = std::mem::replace(&mut built.updates, placeholder);
    let handle = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.run(updates).await })
    };

    let mut launcher = TaskLauncher::new();
    built.pipeline.start(&mut launcher).unwrap();
    (launcher, tracker, handle)
}

async fn publish_all(built: &BuiltPipeline, records: Vec<DestinationRecord>) {
    for record in records {
        built.input.publish_record(record).await.unwrap();
    }
}

#[tokio::test]
async fn test_buffered_load_persists_every_checkpoint() {
    let sink = Arc::new(RecordingSink::new());
    let config = LoadPipelineConfig::default()
        .with_num_partitions(2)
        .with_target_batch_size_bytes(64 * 1024)
        .with_memory_budget_bytes(1024 * 1024);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .buffered_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, tracker, tracking) = start(&mut built);

    publish_all(&built, records("users", 1, 6)).await;
    publish_all(&built, records("orders", 2, 4)).await;
    built.input.end_of_stream(&stream("users")).await.unwrap();
    built.input.end_of_stream(&stream("orders")).await.unwrap();
    built.input.close();

    launcher.join().await.unwrap();
    tracking.await.unwrap();

    assert_eq!(tracker.persisted_count(&stream("users"), CheckpointId(1)), 6);
    assert_eq!(tracker.persisted_count(&stream("orders"), CheckpointId(2)), 4);
    assert!(tracker.is_stream_complete(&stream("users"), built.final_step_workers));
    assert!(tracker.is_stream_complete(&stream("orders"), built.final_step_workers));
    assert_eq!(sink.record_count(), 10);

    let budget = built.memory_budget.as_ref().unwrap();
    assert_eq!(budget.used(), 0);

    let metrics = built.metrics.step(STEP_LOAD);
    assert_eq!(metrics.inputs_accepted(), 10);
}

#[tokio::test]
async fn test_accumulate_then_load_stages_before_persisting() {
    let sink = Arc::new(RecordingSink::new());
    let config = LoadPipelineConfig::default()
        .with_num_partitions(3)
        .with_num_load_workers(2)
        .with_target_batch_size_bytes(64 * 1024)
        .with_memory_budget_bytes(1024 * 1024);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .accumulate_then_load(Arc::clone(&sink))
        .unwrap();
    assert_eq!(built.final_step, STEP_LOAD);
    assert_eq!(built.final_step_workers, 2);
    let (launcher, tracker, tracking) = start(&mut built);

    publish_all(&built, records("users", 1, 9)).await;
    built.input.end_of_stream(&stream("users")).await.unwrap();
    built.input.close();

    launcher.join().await.unwrap();
    tracking.await.unwrap();

    let users = stream("users");
    assert_eq!(tracker.count_in_state(&users, CheckpointId(1), BatchState::Staged), 9);
    assert_eq!(tracker.persisted_count(&users, CheckpointId(1)), 9);
    assert!(tracker.is_stream_complete(&users, 2));

    assert_eq!(sink.record_count(), 9);
    assert!(sink.loads().iter().all(|load| load.partition < 2));
    assert_eq!(built.memory_budget.as_ref().unwrap().used(), 0);
    assert_eq!(built.metrics.step(STEP_ACCUMULATE).inputs_accepted(), 9);
}

#[tokio::test]
async fn test_direct_load_completes_loaders() {
    let factory = RecordingLoaderFactory::completing_every(2);
    let mut built = LoadPipelineBuilder::new(LoadPipelineConfig::default())
        .unwrap()
        .direct_load(factory.clone())
        .unwrap();
    let (launcher, tracker, tracking) = start(&mut built);

    publish_all(&built, records("users", 3, 5)).await;
    built.input.end_of_stream(&stream("users")).await.unwrap();
    built.input.close();

    launcher.join().await.unwrap();
    tracking.await.unwrap();

    assert_eq!(factory.accepted(), 5);
    assert_eq!(factory.created().len(), 3);
    assert_eq!(factory.finished(), 1);
    assert!(tracker.is_checkpoint_persisted(&stream("users"), CheckpointId(3), 5));
    assert!(tracker.is_stream_complete(&stream("users"), 1));
}

#[tokio::test]
async fn test_micro_batch_heartbeat_acknowledges_before_end_of_stream() {
    let sink = Arc::new(RecordingSink::new());
    let config = LoadPipelineConfig::default().with_micro_batch_override(true);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .buffered_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, tracker, tracking) = start(&mut built);

    publish_all(&built, vec![record("users", 7), record("users", 7), record("users", 7)]).await;
    built.input.heartbeat().await.unwrap();

    let users = stream("users");
    tokio::time::timeout(Duration::from_secs(5), async {
        while !tracker.is_checkpoint_persisted(&users, CheckpointId(7), 3) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!tracker.is_stream_complete(&users, 1));

    built.input.end_of_stream(&users).await.unwrap();
    built.input.close();
    launcher.join().await.unwrap();
    tracking.await.unwrap();

    assert_eq!(sink.load_count(), 1);
    assert!(tracker.is_stream_complete(&users, 1));
    assert!(tracker.last_update_at().is_some());
}

#[tokio::test]
async fn test_sink_failure_stops_pipeline() {
    let sink = Arc::new(FailingSink::new("warehouse unavailable"));
    let config = LoadPipelineConfig::default().with_num_partitions(2);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .buffered_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, tracker, tracking) = start(&mut built);
    let token = Arc::clone(launcher.cancel_token());

    publish_all(&built, records("users", 1, 4)).await;
    built.input.end_of_stream(&stream("users")).await.unwrap();
    built.input.close();

    let err = launcher.join().await.unwrap_err();
    tracking.await.unwrap();

    assert!(err.is_sink_failure());
    assert!(token.is_cancelled());
    assert!(sink.call_count() >= 1);
    assert_eq!(tracker.persisted_count(&stream("users"), CheckpointId(1)), 0);
    assert_eq!(built.metrics.step(STEP_LOAD).sink_failures(), 1);
}

#[tokio::test]
async fn test_stop_closes_queues_between_steps() {
    let sink = Arc::new(RecordingSink::new());
    let config = LoadPipelineConfig::default().with_num_partitions(2).with_num_load_workers(2);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .accumulate_then_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, _tracker, tracking) = start(&mut built);

    built.pipeline.stop();
    built.input.close();

    launcher.join().await.unwrap();
    tracking.await.unwrap();
    assert_eq!(sink.load_count(), 0);
}

#[tokio::test]
async fn test_dedupe_streams_route_by_primary_key() {
    let sink = Arc::new(RecordingSink::new());
    let catalog = TestCatalog::new().with_dedupe("users", &["id"]).build();
    let config = LoadPipelineConfig::default().with_num_partitions(4);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .with_catalog(catalog)
        .unwrap()
        .buffered_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, _tracker, tracking) = start(&mut built);

    let users: Vec<DestinationRecord> = (0..12)
        .map(|i| DestinationRecord::new(stream("users"), json!({"id": i % 3, "seq": i}), CheckpointId(1)))
        .collect();
    publish_all(&built, users).await;
    built.input.end_of_stream(&stream("users")).await.unwrap();
    built.input.close();

    launcher.join().await.unwrap();
    tracking.await.unwrap();

    let mut partitions_by_id: HashMap<i64, BTreeSet<usize>> = HashMap::new();
    for load in sink.loads() {
        for data in &load.data {
            let id = data["id"].as_i64().unwrap();
            partitions_by_id.entry(id).or_default().insert(load.partition);
        }
    }
    assert_eq!(partitions_by_id.len(), 3);
    assert!(partitions_by_id.values().all(|parts| parts.len() == 1));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_ticker_flushes_aged_batches() {
    let sink = Arc::new(RecordingSink::new());
    let config = LoadPipelineConfig::default()
        .with_heartbeat_interval_ms(1_000)
        .with_max_time_without_flush_ms(2_500);
    let mut built = LoadPipelineBuilder::new(config)
        .unwrap()
        .buffered_load(Arc::clone(&sink))
        .unwrap();
    let (launcher, _tracker, tracking) = start(&mut built);
    let ticker = built.start_heartbeat();

    publish_all(&built, vec![record("users", 1)]).await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(sink.load_count(), 0);

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(sink.load_count(), 1);

    ticker.stop();
    built.input.close();
    launcher.join().await.unwrap();
    tracking.await.unwrap();
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = LoadPipelineBuilder::new(LoadPipelineConfig::default().with_num_partitions(0)).unwrap_err();
    assert_eq!(err.kind(), "config");
}

#[test]
fn test_builder_rejects_budget_below_batch_size() {
    let config = LoadPipelineConfig::default().with_memory_budget_bytes(100);
    let err = LoadPipelineBuilder::new(config).unwrap_err();
    assert!(err.to_string().contains("memory_budget_bytes"));
}

#[test]
fn test_catalog_without_primary_key_is_rejected() {
    let catalog = TestCatalog::new().with_dedupe("users", &[]).build();
    let builder = LoadPipelineBuilder::new(LoadPipelineConfig::default()).unwrap();
    assert!(builder.with_catalog(catalog).is_err());
}
