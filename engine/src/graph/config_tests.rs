// config_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use super::config::*;
use crate::error::StreamDagError;
use std::fs;
use std::path::Path;

#[test]
fn test_subgraph_prefix_helpers() {
    assert!(is_subgraph_item("subgraph:decode"));
    assert!(!is_subgraph_item("subgraph:"));
    assert!(!is_subgraph_item("decode"));
    assert_eq!(strip_subgraph_prefix("subgraph:decode"), "decode");
    assert_eq!(strip_subgraph_prefix("decode"), "decode");
}

#[test]
fn test_profiler_config_defaults() {
    let config = ProfilerConfig::from_json_str("{}").unwrap();
    assert!(!config.enable_profiling);
    assert!(!config.enable_tracing);
    assert_eq!(config.trace_event_capacity, DEFAULT_TRACE_EVENT_CAPACITY);
}

#[test]
fn test_profiler_config_parse() {
    let config = ProfilerConfig::from_json_str(
        r#"{"enable_profiling": true, "enable_tracing": true, "trace_event_capacity": 64}"#,
    )
    .unwrap();
    assert!(config.enable_profiling);
    assert!(config.enable_tracing);
    assert_eq!(config.trace_event_capacity, 64);
}

#[test]
fn test_profiler_config_wrong_types() {
    assert!(ProfilerConfig::from_json_str(r#"{"enable_profiling": "true"}"#).is_err());
    assert!(ProfilerConfig::from_json_str(r#"{"enable_tracing": 1}"#).is_err());
    assert!(ProfilerConfig::from_json_str(r#"{"trace_event_capacity": -1}"#).is_err());
    assert!(ProfilerConfig::from_json_str("[]").is_err());
}

#[test]
fn test_profiler_config_unknown_key() {
    let result = ProfilerConfig::from_json_str(r#"{"enable_magic": true}"#);
    if let Err(StreamDagError::InvalidConfig(msg)) = result {
        assert!(msg.contains("enable_magic"));
    } else {
        panic!("Expected InvalidConfig error");
    }
}

#[test]
fn test_module_config_parse() {
    let config = ModuleConfig::from_json_str(
        "decoder",
        r#"{
            "class_name": "Passthrough",
            "parallelism": 4,
            "max_input_queue_size": 8,
            "next_modules": ["infer", "osd"],
            "custom_params": {"device": "cpu", "batch": 16, "fast": true}
        }"#,
    )
    .unwrap();
    assert_eq!(config.name, "decoder");
    assert_eq!(config.class_name, "Passthrough");
    assert_eq!(config.parallelism, 4);
    assert_eq!(config.max_input_queue_size, 8);
    assert_eq!(config.next.iter().collect::<Vec<_>>(), vec!["infer", "osd"]);
    assert_eq!(config.parameters.get("device").map(String::as_str), Some("cpu"));
    assert_eq!(config.parameters.get("batch").map(String::as_str), Some("16"));
    assert_eq!(config.parameters.get("fast").map(String::as_str), Some("true"));
}

#[test]
fn test_module_config_defaults() {
    let config = ModuleConfig::from_json_str("src", r#"{"class_name": "Source"}"#).unwrap();
    assert_eq!(config.parallelism, DEFAULT_PARALLELISM);
    assert_eq!(config.max_input_queue_size, DEFAULT_MAX_INPUT_QUEUE_SIZE);
    assert!(config.next.is_empty());
    assert!(config.parameters.is_empty());
}

#[test]
fn test_module_config_missing_class_name() {
    let result = ModuleConfig::from_json_str("src", r#"{"parallelism": 1}"#);
    if let Err(StreamDagError::InvalidConfig(msg)) = result {
        assert!(msg.starts_with("[src]"));
        assert!(msg.contains("class_name"));
    } else {
        panic!("Expected InvalidConfig error");
    }
}

#[test]
fn test_module_config_wrong_types() {
    let cases = [
        r#"{"class_name": 3}"#,
        r#"{"class_name": "A", "parallelism": -2}"#,
        r#"{"class_name": "A", "parallelism": "2"}"#,
        r#"{"class_name": "A", "max_input_queue_size": 1.5}"#,
        r#"{"class_name": "A", "next_modules": "b"}"#,
        r#"{"class_name": "A", "next_modules": [1]}"#,
        r#"{"class_name": "A", "custom_params": []}"#,
    ];
    for case in cases {
        assert!(
            ModuleConfig::from_json_str("a", case).is_err(),
            "accepted {}",
            case
        );
    }
}

#[test]
fn test_module_config_builder() {
    let config = ModuleConfig::new("a", "Passthrough")
        .with_next(["b"])
        .with_parallelism(3)
        .with_max_input_queue_size(5)
        .with_param("k", "v");
    assert_eq!(config.parallelism, 3);
    assert_eq!(config.max_input_queue_size, 5);
    assert!(config.next.contains("b"));
    assert_eq!(config.parameters["k"], "v");
}

#[test]
fn test_graph_config_from_str() {
    let config = GraphConfig::from_json_str(
        r#"{
            "profiler_config": {"enable_profiling": true},
            "src": {"class_name": "Source", "next_modules": ["subgraph:analytics"]},
            "subgraph:analytics": {"config_path": "analytics.json", "next_modules": ["sink"]},
            "sink": {"class_name": "Passthrough"}
        }"#,
    )
    .unwrap();
    assert!(config.profiler_config.enable_profiling);
    assert_eq!(config.module_configs.len(), 2);
    assert_eq!(config.module_configs[0].name, "src");
    assert_eq!(config.module_configs[1].name, "sink");
    assert_eq!(config.subgraph_configs.len(), 1);
    assert_eq!(config.subgraph_configs[0].name, "subgraph:analytics");
    assert_eq!(config.subgraph_configs[0].config_path, Path::new("analytics.json"));
    assert!(config.config_path.is_none());
}

#[test]
fn test_graph_config_subgraph_without_path() {
    let result = GraphConfig::from_json_str(r#"{"subgraph:a": {"next_modules": []}}"#);
    assert!(matches!(result, Err(StreamDagError::InvalidConfig(_))));
}

#[test]
fn test_graph_config_not_json() {
    let result = GraphConfig::from_json_str("{ not json");
    assert!(matches!(result, Err(StreamDagError::Json(_))));
}

#[test]
fn test_graph_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detection.json");
    fs::write(
        &path,
        r#"{
            "src": {"class_name": "Source", "next_modules": ["subgraph:post"],
                    "custom_params": {"json_file_dir": "/elsewhere"}},
            "subgraph:post": {"config_path": "post/post.json"}
        }"#,
    )
    .unwrap();

    let config = GraphConfig::from_json_file(&path).unwrap();
    assert_eq!(config.name, "detection");
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));

    // The file directory always wins over a user supplied value
    let expected_dir = format!("{}/", dir.path().display());
    assert_eq!(config.module_configs[0].parameters[JSON_FILE_DIR_PARAM], expected_dir);

    // Relative sub-graph paths resolve against the declaring file
    assert_eq!(config.subgraph_configs[0].config_path, dir.path().join("post/post.json"));
}

#[test]
fn test_graph_config_missing_file() {
    let result = GraphConfig::from_json_file("/nonexistent/streamdag/graph.json");
    assert!(matches!(result, Err(StreamDagError::Io(_))));
}

#[test]
fn test_path_relative_to_config() {
    let mut params = ModuleParamSet::new();
    assert_eq!(path_relative_to_config("a.bin", &params), Path::new("./a.bin"));
    params.insert(JSON_FILE_DIR_PARAM.to_string(), "/data/cfg/".to_string());
    assert_eq!(path_relative_to_config("a.bin", &params), Path::new("/data/cfg/a.bin"));
    assert_eq!(path_relative_to_config("/abs/a.bin", &params), Path::new("/abs/a.bin"));
}
