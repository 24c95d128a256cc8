// pipeline_integration.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

//! End to end runs of pipelines built from JSON configurations

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use streamdag::{
    create_message_channel, BroadcastObserver, Frame, GraphConfig, Pipeline, Registry, StreamMsg,
    StreamMsgType,
};

fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn write_config(dir: &Path, file: &str, json: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, json).unwrap();
    path
}

fn unique_stream() -> String {
    format!("stream-{}", uuid::Uuid::new_v4())
}

fn collect_messages(pipeline: &Pipeline) -> Arc<Mutex<Vec<StreamMsg>>> {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    pipeline.set_stream_msg_observer(Some(Arc::new(move |msg: &StreamMsg| {
        sink.lock().push(msg.clone())
    })));
    messages
}

fn count(messages: &Mutex<Vec<StreamMsg>>, kind: StreamMsgType, stream: &str) -> usize {
    messages
        .lock()
        .iter()
        .filter(|m| m.kind == kind && m.stream_id == stream)
        .count()
}

fn build(config: &str, name: &str) -> (tempfile::TempDir, Pipeline) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), &format!("{}.json", name), config);
    let mut pipeline = Pipeline::new(name);
    pipeline
        .build_from_json_file(&path, &Registry::with_builtins())
        .unwrap();
    (dir, pipeline)
}

#[test]
fn test_backpressure_blocks_producer_without_dropping() {
    let config = r#"{
        "src": { "class_name": "Source", "next_modules": ["slow"] },
        "slow": {
            "class_name": "Delay",
            "parallelism": 4,
            "max_input_queue_size": 20,
            "custom_params": { "delay_ms": "20" }
        }
    }"#;
    let (_dir, pipeline) = build(config, "bp");
    let done = Arc::new(AtomicUsize::new(0));
    {
        let done = Arc::clone(&done);
        pipeline.set_frame_done_callback(move |_| {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    pipeline.start().unwrap();
    let pipeline = Arc::new(pipeline);

    let provided = Arc::new(AtomicUsize::new(0));
    let producer = {
        let pipeline = Arc::clone(&pipeline);
        let provided = Arc::clone(&provided);
        thread::spawn(move || {
            for ts in 0..25 {
                let frame = Frame::with_timestamp("s0", ts).unwrap();
                pipeline.provide_data("src", frame).unwrap();
                provided.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    // One stream uses a single conveyor: 20 frames queued, the producer waits
    let link = "bp/src-->bp/slow";
    assert!(wait_until(|| {
        let status = pipeline.query_link_status(link).unwrap();
        status.cache_size[0] == 20 && provided.load(Ordering::SeqCst) < 25
    }));
    let status = pipeline.query_link_status(link).unwrap();
    assert_eq!(status.cache_size.len(), 4);
    assert!(status.cache_size.iter().all(|size| *size <= 20));

    producer.join().unwrap();
    assert_eq!(provided.load(Ordering::SeqCst), 25);
    assert!(wait_until(|| done.load(Ordering::SeqCst) == 25));
    pipeline.stop();
}

#[test]
fn test_failing_stream_does_not_affect_others() {
    let config = r#"{
        "src": { "class_name": "Source", "next_modules": ["check"] },
        "check": {
            "class_name": "ErrorInjector",
            "parallelism": 2,
            "next_modules": ["sink"],
            "custom_params": { "fail_streams": "s1" }
        },
        "sink": { "class_name": "Passthrough", "parallelism": 2 }
    }"#;
    let (_dir, pipeline) = build(config, "errors");
    let messages = collect_messages(&pipeline);
    let done = Arc::new(Mutex::new(Vec::new()));
    {
        let done = Arc::clone(&done);
        pipeline.set_frame_done_callback(move |frame| {
            done.lock().push(frame.stream_id().to_string())
        });
    }
    pipeline.start().unwrap();

    for ts in 0..5 {
        for stream in ["s0", "s2"] {
            let frame = Frame::with_timestamp(stream, ts).unwrap();
            pipeline.provide_data("src", frame).unwrap();
        }
    }
    pipeline
        .provide_data("src", Frame::with_timestamp("s1", 0).unwrap())
        .unwrap();
    for stream in ["s0", "s1", "s2"] {
        pipeline.provide_data("src", Frame::eos(stream).unwrap()).unwrap();
    }

    for stream in ["s0", "s1", "s2"] {
        assert!(pipeline.wait_for_stream_eos(stream, Duration::from_secs(5)));
        assert!(wait_until(|| count(&messages, StreamMsgType::Eos, stream) == 1));
    }
    assert!(wait_until(|| count(&messages, StreamMsgType::StreamError, "s1") == 1));
    let error = messages
        .lock()
        .iter()
        .find(|m| m.kind == StreamMsgType::StreamError)
        .cloned()
        .unwrap();
    assert_eq!(error.module_name, "errors/check");
    assert_eq!(count(&messages, StreamMsgType::StreamError, "s0"), 0);
    assert_eq!(count(&messages, StreamMsgType::StreamError, "s2"), 0);

    let done = done.lock().clone();
    assert_eq!(done.iter().filter(|s| *s == "s0").count(), 5);
    assert_eq!(done.iter().filter(|s| *s == "s2").count(), 5);
    assert!(!done.iter().any(|s| s == "s1"));
    assert!(pipeline.is_running());
    pipeline.stop();
}

#[test]
fn test_eos_exactly_once_per_stream() {
    let config = r#"{
        "src": { "class_name": "Source", "next_modules": ["a", "b"] },
        "a": { "class_name": "Passthrough", "parallelism": 3, "next_modules": ["c"] },
        "b": { "class_name": "Passthrough", "parallelism": 2, "next_modules": ["c"] },
        "c": { "class_name": "Passthrough", "parallelism": 4 }
    }"#;
    let (_dir, pipeline) = build(config, "eos");
    let messages = collect_messages(&pipeline);
    let done = Arc::new(AtomicUsize::new(0));
    {
        let done = Arc::clone(&done);
        pipeline.set_frame_done_callback(move |_| {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    pipeline.start().unwrap();

    let streams: Vec<String> = (0..8).map(|_| unique_stream()).collect();
    for ts in 0..20 {
        for stream in &streams {
            let frame = Frame::with_timestamp(stream.as_str(), ts).unwrap();
            pipeline.provide_data("src", frame).unwrap();
        }
    }
    for stream in &streams {
        pipeline
            .provide_data("src", Frame::eos(stream.as_str()).unwrap())
            .unwrap();
    }

    for stream in &streams {
        assert!(pipeline.wait_for_stream_eos(stream, Duration::from_secs(10)));
    }
    assert!(wait_until(|| messages.lock().len() == streams.len()));
    for stream in &streams {
        assert_eq!(count(&messages, StreamMsgType::Eos, stream), 1);
    }
    assert_eq!(done.load(Ordering::SeqCst), 8 * 20);
    pipeline.stop();
    assert_eq!(messages.lock().len(), streams.len());
}

#[test]
fn test_streams_beyond_limit_fail_until_released() {
    let config = r#"{
        "src": { "class_name": "Source", "next_modules": ["sink"] },
        "sink": { "class_name": "Passthrough" }
    }"#;
    let (_dir, pipeline) = build(config, "limit");
    pipeline.start().unwrap();

    let streams: Vec<String> = (0..streamdag::pipeline::MAX_STREAM_NUM)
        .map(|_| unique_stream())
        .collect();
    for stream in &streams {
        pipeline
            .provide_data("src", Frame::new(stream.as_str()).unwrap())
            .unwrap();
    }
    let result = pipeline.provide_data("src", Frame::new("extra").unwrap());
    if let Err(streamdag::StreamDagError::StreamLimit(id)) = result {
        assert_eq!(id, "extra");
    } else {
        panic!("Expected StreamLimit error");
    }

    pipeline
        .provide_data("src", Frame::eos(streams[0].as_str()).unwrap())
        .unwrap();
    assert!(pipeline.wait_for_stream_eos(&streams[0], Duration::from_secs(5)));
    pipeline
        .provide_data("src", Frame::new("extra").unwrap())
        .unwrap();
    pipeline.stop();
}

#[test]
fn test_multi_source_join_with_tags() {
    let config = r#"{
        "camera": { "class_name": "Source", "next_modules": ["detect"] },
        "radar": { "class_name": "Source", "next_modules": ["fuse"] },
        "detect": {
            "class_name": "Tagger",
            "next_modules": ["fuse"],
            "custom_params": { "tag": "detector" }
        },
        "fuse": { "class_name": "Tagger", "parallelism": 2 }
    }"#;
    let (_dir, pipeline) = build(config, "fusion");
    assert_eq!(
        pipeline.head_names().into_iter().collect::<HashSet<_>>(),
        HashSet::from(["fusion/camera".to_string(), "fusion/radar".to_string()])
    );
    let messages = collect_messages(&pipeline);
    let tags = Arc::new(Mutex::new(Vec::new()));
    {
        let tags = Arc::clone(&tags);
        pipeline.set_frame_done_callback(move |frame| {
            let mut seen = frame.collection().tags();
            seen.sort();
            tags.lock().push(seen);
        });
    }
    pipeline.start().unwrap();

    for ts in 0..3 {
        pipeline
            .provide_data("camera", Frame::with_timestamp("s0", ts).unwrap())
            .unwrap();
        pipeline
            .provide_data("radar", Frame::with_timestamp("s0", 100 + ts).unwrap())
            .unwrap();
    }
    pipeline.provide_data("camera", Frame::eos("s0").unwrap()).unwrap();
    pipeline.provide_data("radar", Frame::eos("s0").unwrap()).unwrap();

    assert!(wait_until(|| count(&messages, StreamMsgType::Eos, "s0") == 1));
    let tags = tags.lock().clone();
    assert_eq!(tags.len(), 6);
    let from_camera = tags
        .iter()
        .filter(|t| **t == vec!["detector".to_string(), "fusion/fuse".to_string()])
        .count();
    let from_radar = tags
        .iter()
        .filter(|t| **t == vec!["fusion/fuse".to_string()])
        .count();
    assert_eq!(from_camera, 3);
    assert_eq!(from_radar, 3);
    pipeline.stop();
}

#[test]
fn test_pipeline_with_subgraph_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("parts")).unwrap();
    write_config(
        &dir.path().join("parts"),
        "filter.json",
        r#"{
            "pre": { "class_name": "Passthrough", "next_modules": ["post"] },
            "post": { "class_name": "Tagger", "custom_params": { "tag": "filtered" } }
        }"#,
    );
    let root = write_config(
        dir.path(),
        "app.json",
        r#"{
            "profiler_config": { "enable_profiling": true },
            "src": { "class_name": "Source", "next_modules": ["subgraph:filter"] },
            "subgraph:filter": { "config_path": "parts/filter.json", "next_modules": ["sink"] },
            "sink": { "class_name": "Passthrough" }
        }"#,
    );

    let mut pipeline = Pipeline::new("app");
    pipeline
        .build_from_json_file(&root, &Registry::with_builtins())
        .unwrap();
    assert_eq!(
        pipeline.module_names(),
        vec!["app/src", "app/filter/pre", "app/filter/post", "app/sink"]
    );
    assert_eq!(
        pipeline.link_ids(),
        vec![
            "app/src-->app/filter/pre",
            "app/filter/pre-->app/filter/post",
            "app/filter/post-->app/sink"
        ]
    );
    let post = pipeline.get_module_config("app/filter/post").unwrap();
    let dir_param = post.parameters.get("json_file_dir").unwrap();
    assert!(dir_param.ends_with("parts/"));

    let messages = collect_messages(&pipeline);
    pipeline.start().unwrap();
    let stream = unique_stream();
    for ts in 0..4 {
        let frame = Frame::with_timestamp(stream.as_str(), ts).unwrap();
        pipeline.provide_data("src", frame).unwrap();
    }
    pipeline
        .provide_data("src", Frame::eos(stream.as_str()).unwrap())
        .unwrap();
    assert!(wait_until(|| count(&messages, StreamMsgType::Eos, &stream) == 1));

    let profile = pipeline.profile().unwrap();
    assert_eq!(profile.overall_profile.completed, 4);
    assert_eq!(profile.module_profiles.len(), 4);
    let json = serde_json::to_value(&profile).unwrap();
    assert_eq!(json["module_profiles"][1]["module_name"], "app/filter/pre");
    pipeline.stop();
}

#[test]
fn test_subgraph_loop_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "loop.json",
        r#"{
            "src": { "class_name": "Source", "next_modules": ["subgraph:again"] },
            "subgraph:again": { "config_path": "loop.json" }
        }"#,
    );
    let mut pipeline = Pipeline::new("loop");
    let result = pipeline.build_from_json_file(&path, &Registry::with_builtins());
    if let Err(streamdag::StreamDagError::SubgraphLoop(_)) = result {
    } else {
        panic!("Expected SubgraphLoop error, got {:?}", result.err());
    }
}

#[test]
fn test_config_parsed_from_string() {
    let mut config = GraphConfig::from_json_str(
        r#"{
            "src": { "class_name": "Source", "next_modules": ["wait"] },
            "wait": { "class_name": "Delay", "custom_params": { "delay_ms": 1 } }
        }"#,
    )
    .unwrap();
    config.name = "inline".to_string();
    let mut pipeline = Pipeline::new("inline");
    pipeline.build(config, &Registry::with_builtins()).unwrap();
    let wait = pipeline.get_module_config("wait").unwrap();
    // Non string values are kept as their JSON text
    assert_eq!(wait.parameters.get("delay_ms").map(String::as_str), Some("1"));
    assert!(wait.parameters.get("json_file_dir").is_none());
}

#[tokio::test]
async fn test_broadcast_observer_bridge() {
    let config = r#"{
        "src": { "class_name": "Source", "next_modules": ["work"] },
        "work": { "class_name": "ErrorInjector", "custom_params": { "fail_streams": "bad" } }
    }"#;
    let (_dir, pipeline) = build(config, "bridge");
    let (tx, mut rx) = create_message_channel();
    pipeline.set_stream_msg_observer(Some(Arc::new(BroadcastObserver::new(tx))));
    assert!(pipeline.has_stream_msg_observer());
    pipeline.start().unwrap();
    let pipeline = Arc::new(pipeline);

    let feeder = {
        let pipeline = Arc::clone(&pipeline);
        tokio::task::spawn_blocking(move || {
            for stream in ["good", "bad"] {
                pipeline
                    .provide_data("src", Frame::new(stream).unwrap())
                    .unwrap();
                pipeline.provide_data("src", Frame::eos(stream).unwrap()).unwrap();
            }
        })
    };
    feeder.await.unwrap();

    let mut pending: HashSet<&str> = HashSet::from(["good", "bad"]);
    let mut errors = Vec::new();
    let received = tokio::time::timeout(Duration::from_secs(10), async {
        while !pending.is_empty() || errors.is_empty() {
            let msg = rx.recv().await.unwrap();
            match msg.kind {
                StreamMsgType::Eos => {
                    pending.remove(msg.stream_id.as_str());
                }
                StreamMsgType::StreamError => errors.push(msg.stream_id.clone()),
                _ => {}
            }
        }
    })
    .await;
    assert!(received.is_ok());
    assert_eq!(errors, vec!["bad".to_string()]);

    let stopper = Arc::clone(&pipeline);
    tokio::task::spawn_blocking(move || stopper.stop())
        .await
        .unwrap();
}
