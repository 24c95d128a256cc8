// collection_tests.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use super::collection::*;
use crate::error::StreamDagError;
use std::sync::Arc;
use std::thread;

#[derive(Debug, PartialEq)]
struct Detection {
    label: String,
    score: f32,
}

#[test]
fn test_add_and_get() {
    let collection = Collection::new();
    collection
        .add(
            "detections",
            Detection {
                label: "car".to_string(),
                score: 0.9,
            },
        )
        .unwrap();

    let value = collection.get::<Detection>("detections").unwrap();
    assert_eq!(value.label, "car");
    assert!(collection.has_value("detections"));
}

#[test]
fn test_add_existing_tag_fails() {
    let collection = Collection::new();
    collection.add("count", 1u32).unwrap();
    let result = collection.add("count", 2u32);
    if let Err(StreamDagError::TagExists(tag)) = result {
        assert_eq!(tag, "count");
    } else {
        panic!("Expected TagExists error");
    }
    assert_eq!(*collection.get::<u32>("count").unwrap(), 1);
}

#[test]
fn test_add_if_not_exists() {
    let collection = Collection::new();
    assert!(collection.add_if_not_exists("name", "first".to_string()));
    assert!(!collection.add_if_not_exists("name", "second".to_string()));
    assert_eq!(*collection.get::<String>("name").unwrap(), "first");
}

#[test]
fn test_get_missing_tag() {
    let collection = Collection::new();
    let result = collection.get::<u32>("missing");
    assert!(matches!(result, Err(StreamDagError::TagNotFound(_))));
}

#[test]
fn test_get_wrong_type() {
    let collection = Collection::new();
    collection.add("value", 10i64).unwrap();
    let result = collection.get::<String>("value");
    if let Err(StreamDagError::TypeMismatch { tag, expected }) = result {
        assert_eq!(tag, "value");
        assert!(expected.contains("String"));
    } else {
        panic!("Expected TypeMismatch error");
    }
}

#[test]
fn test_is_type() {
    let collection = Collection::new();
    collection.add("value", 10i64).unwrap();
    assert!(collection.is_type::<i64>("value"));
    assert!(!collection.is_type::<i32>("value"));
    assert!(!collection.is_type::<i64>("other"));
}

#[test]
fn test_remove_and_tags() {
    let collection = Collection::new();
    collection.add("b", 1u8).unwrap();
    collection.add("a", 2u8).unwrap();
    assert_eq!(collection.tags(), vec!["a".to_string(), "b".to_string()]);
    assert!(collection.remove("a"));
    assert!(!collection.remove("a"));
    assert_eq!(collection.tags(), vec!["b".to_string()]);
}

#[test]
fn test_concurrent_adds_from_branches() {
    let collection = Arc::new(Collection::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let collection = Arc::clone(&collection);
            thread::spawn(move || {
                collection.add(&format!("branch-{}", i), i).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(collection.tags().len(), 8);
    assert_eq!(*collection.get::<i32>("branch-5").unwrap(), 5);
}
