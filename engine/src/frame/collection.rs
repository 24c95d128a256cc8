// collection.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, StreamDagError};

type Value = Arc<dyn Any + Send + Sync>;

/// Tagged heterogeneous store carried by every frame.
///
/// Modules on different branches of a fan-out may add and read entries
/// concurrently. Values are stored behind `Arc` so `get` hands out a shared
/// reference without holding the store lock.
#[derive(Default)]
pub struct Collection {
    data: Mutex<BTreeMap<String, Value>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under `tag`. Fails when the tag is already taken.
    pub fn add<T: Any + Send + Sync>(&self, tag: &str, value: T) -> Result<Arc<T>> {
        let mut data = self.data.lock();
        if data.contains_key(tag) {
            return Err(StreamDagError::TagExists(tag.to_string()));
        }
        let value = Arc::new(value);
        data.insert(tag.to_string(), value.clone());
        Ok(value)
    }

    /// Returns `false` and leaves the store untouched when `tag` exists.
    pub fn add_if_not_exists<T: Any + Send + Sync>(&self, tag: &str, value: T) -> bool {
        let mut data = self.data.lock();
        if data.contains_key(tag) {
            return false;
        }
        data.insert(tag.to_string(), Arc::new(value));
        true
    }

    pub fn get<T: Any + Send + Sync>(&self, tag: &str) -> Result<Arc<T>> {
        let value = self
            .data
            .lock()
            .get(tag)
            .cloned()
            .ok_or_else(|| StreamDagError::TagNotFound(tag.to_string()))?;
        value.downcast::<T>().map_err(|_| StreamDagError::TypeMismatch {
            tag: tag.to_string(),
            expected: type_name::<T>(),
        })
    }

    pub fn has_value(&self, tag: &str) -> bool {
        self.data.lock().contains_key(tag)
    }

    /// `false` when nothing is stored under `tag`.
    pub fn is_type<T: Any>(&self, tag: &str) -> bool {
        self.data
            .lock()
            .get(tag)
            .is_some_and(|value| (**value).type_id() == TypeId::of::<T>())
    }

    pub fn remove(&self, tag: &str) -> bool {
        self.data.lock().remove(tag).is_some()
    }

    pub fn tags(&self) -> Vec<String> {
        self.data.lock().keys().cloned().collect()
    }
}
