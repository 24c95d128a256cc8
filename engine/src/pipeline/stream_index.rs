// stream_index.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of StreamDag
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use crate::error::{Result, StreamDagError};

/// Streams a pipeline can carry at once.
pub const MAX_STREAM_NUM: usize = 64;

/// Hands each live stream the lowest free index below `MAX_STREAM_NUM`.
#[derive(Debug)]
pub struct StreamIndexAllocator {
    indexes: HashMap<String, u32>,
    used: Vec<bool>,
}

impl Default for StreamIndexAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIndexAllocator {
    pub fn new() -> Self {
        Self {
            indexes: HashMap::new(),
            used: vec![false; MAX_STREAM_NUM],
        }
    }

    /// Index of `stream_id`, allocated on first use.
    pub fn get_or_allocate(&mut self, stream_id: &str) -> Result<u32> {
        if let Some(index) = self.indexes.get(stream_id) {
            return Ok(*index);
        }
        let free = self
            .used
            .iter()
            .position(|used| !used)
            .ok_or_else(|| StreamDagError::StreamLimit(stream_id.to_string()))?;
        self.used[free] = true;
        let index = free as u32;
        self.indexes.insert(stream_id.to_string(), index);
        Ok(index)
    }

    pub fn get(&self, stream_id: &str) -> Option<u32> {
        self.indexes.get(stream_id).copied()
    }

    /// Returns the index of `stream_id` to the pool.
    pub fn release(&mut self, stream_id: &str) -> Option<u32> {
        let index = self.indexes.remove(stream_id)?;
        self.used[index as usize] = false;
        Some(index)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}
